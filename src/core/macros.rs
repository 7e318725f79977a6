//! Macros for declaring the small enumerated states of the assembly.

/// Declare a field-less state enum and implement [`State`](crate::core::State)
/// and `Display` for it.
///
/// Each variant carries the label used in logs and status messages.
///
/// # Example
///
/// ```
/// use trombone::core::State;
/// use trombone::state_enum;
///
/// state_enum! {
///     pub enum AxisPower {
///         Off => "off",
///         On => "on",
///     }
/// }
///
/// assert_eq!(AxisPower::On.name(), "on");
/// assert_eq!(AxisPower::Off.to_string(), "off");
/// ```
#[macro_export]
macro_rules! state_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident => $label:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, serde::Serialize, serde::Deserialize)]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant
            ),*
        }

        impl $name {
            /// Every variant, in declaration order.
            #[allow(dead_code)]
            pub const ALL: &'static [$name] = &[$(Self::$variant),*];
        }

        impl $crate::core::State for $name {
            fn name(&self) -> &str {
                match self {
                    $(Self::$variant => $label),*
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str($crate::core::State::name(self))
            }
        }
    };
}
