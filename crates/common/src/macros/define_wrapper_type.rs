#[macro_export]
macro_rules! impl_for_wrapper {
    (Display, $ident: ident) => {
        impl std::fmt::Display for $ident {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }
    };
    (FromStr, $ident: ident) => {
        impl std::str::FromStr for $ident {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> anyhow::Result<Self> {
                s.parse().map(Self).map_err(Into::into)
            }
        }
    };
}

/// Defines a read-only newtype around another type.
///
/// ```rust,ignore
/// define_wrapper_type!(
///     #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
///     pub struct CaseIdx(usize) impl Display;
/// );
/// ```
///
/// The generated type gets a constructor, accessors, [`Deref`] to the inner type and conversions
/// in both directions. Wrapped values are never mutated in place, so no `DerefMut` is provided.
/// Additional trait implementations can be requested after the `impl` keyword, see
/// [`impl_for_wrapper`] for the supported ones.
///
/// [`Deref`]: std::ops::Deref
#[macro_export]
macro_rules! define_wrapper_type {
    (
        $(#[$meta: meta])*
        $vis:vis struct $ident: ident($ty: ty)

        $(
            impl $($trait_ident: ident),*
        )?

        ;
    ) => {
        $(#[$meta])*
        $vis struct $ident($ty);

        impl $ident {
            pub fn new(value: impl Into<$ty>) -> Self {
                Self(value.into())
            }

            pub fn into_inner(self) -> $ty {
                self.0
            }

            pub fn as_inner(&self) -> &$ty {
                &self.0
            }
        }

        impl AsRef<$ty> for $ident {
            fn as_ref(&self) -> &$ty {
                &self.0
            }
        }

        impl std::ops::Deref for $ident {
            type Target = $ty;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl From<$ty> for $ident {
            fn from(value: $ty) -> Self {
                Self(value)
            }
        }

        impl From<$ident> for $ty {
            fn from(value: $ident) -> Self {
                value.0
            }
        }

        $(
            $(
                $crate::macros::impl_for_wrapper!($trait_ident, $ident);
            )*
        )?
    };
}

/// Allows the macros to be found in the `macros` module in addition to the crate root.
pub use crate::{define_wrapper_type, impl_for_wrapper};
