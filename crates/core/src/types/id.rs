//! Newtype IDs for type-safe entity references.
//!
//! Every database-assigned key is an `i32` (`SERIAL` / `INTEGER PRIMARY KEY`),
//! wrapped so that a `ProductId` can never be passed where an `OrderId` is
//! expected.

/// Macro to define a type-safe ID wrapper.
///
/// Creates a newtype wrapper around `i32` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_i32()`
/// - `From<i32>` and `Into<i32>` implementations
/// - `sqlx` `Type`, `Encode`, and `Decode` implementations (with `postgres` feature)
///
/// # Example
///
/// ```rust
/// # use shopkeep_core::define_id;
/// define_id!(WidgetId);
/// define_id!(GadgetId);
///
/// let widget = WidgetId::new(1);
/// let gadget = GadgetId::new(1);
///
/// // These are different types, so this won't compile:
/// // let _: WidgetId = gadget;
/// # let _ = (widget, gadget);
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(i32);

        impl $name {
            /// Create a new ID from an i32 value.
            #[must_use]
            pub const fn new(id: i32) -> Self {
                Self(id)
            }

            /// Get the underlying i32 value.
            #[must_use]
            pub const fn as_i32(&self) -> i32 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i32> for $name {
            fn from(id: i32) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Type<::sqlx::Postgres> for $name {
            fn type_info() -> ::sqlx::postgres::PgTypeInfo {
                <i32 as ::sqlx::Type<::sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &::sqlx::postgres::PgTypeInfo) -> bool {
                <i32 as ::sqlx::Type<::sqlx::Postgres>>::compatible(ty)
            }
        }

        #[cfg(feature = "postgres")]
        impl<'r> ::sqlx::Decode<'r, ::sqlx::Postgres> for $name {
            fn decode(
                value: ::sqlx::postgres::PgValueRef<'r>,
            ) -> ::core::result::Result<Self, ::sqlx::error::BoxDynError> {
                let id = <i32 as ::sqlx::Decode<::sqlx::Postgres>>::decode(value)?;
                Ok(Self(id))
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Encode<'_, ::sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut ::sqlx::postgres::PgArgumentBuffer,
            ) -> ::std::result::Result<::sqlx::encode::IsNull, ::sqlx::error::BoxDynError> {
                <i32 as ::sqlx::Encode<::sqlx::Postgres>>::encode_by_ref(&self.0, buf)
            }
        }
    };
}

define_id!(ProductId);
define_id!(UserId);
define_id!(OrderId);
define_id!(OrderItemId);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_id_conversions() {
        let id = ProductId::from(7);
        assert_eq!(id.as_i32(), 7);
        assert_eq!(i32::from(id), 7);
        assert_eq!(id.to_string(), "7");
    }

    #[test]
    fn test_id_serializes_transparently() {
        let json = serde_json::to_string(&OrderId::new(42)).unwrap();
        assert_eq!(json, "42");

        let parsed: OrderId = serde_json::from_str("42").unwrap();
        assert_eq!(parsed, OrderId::new(42));
    }

    #[test]
    fn test_ids_order_numerically() {
        let mut ids = vec![UserId::new(3), UserId::new(1), UserId::new(2)];
        ids.sort();
        assert_eq!(ids, vec![UserId::new(1), UserId::new(2), UserId::new(3)]);
    }
}
