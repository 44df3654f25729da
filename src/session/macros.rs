//! Helper macros for the session state machine modules.

/// Generate debug formatting code for a state or an event holding the serial
/// link, which has no useful debug representation of its own.
macro_rules! impl_debug_with_link {
    (state $type:ident) => {
        impl std::fmt::Debug for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($type))
                    .field("link", &if self.link.is_some() { "open" } else { "moved" })
                    .finish()
            }
        }
    };
    (event $type:ident) => {
        impl std::fmt::Debug for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($type))
                    .field("link", &"open")
                    .finish()
            }
        }
    };
}
