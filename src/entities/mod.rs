//! sea-orm entities for the seller back-office schema.

/// Implements `Display` and `FromStr` for a string-backed active enum.
///
/// Parsing trims and lowercases the input before matching the stored value,
/// and reports unknown strings as `ServiceError::UnknownStatus`.
macro_rules! status_enum_text {
    ($ty:ty) => {
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&sea_orm::ActiveEnum::to_value(self))
            }
        }

        impl std::str::FromStr for $ty {
            type Err = crate::errors::ServiceError;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                let normalized = raw.trim().to_ascii_lowercase();
                <$ty as sea_orm::ActiveEnum>::try_from_value(&normalized)
                    .map_err(|_| crate::errors::ServiceError::UnknownStatus(raw.to_string()))
            }
        }
    };
}

pub(crate) use status_enum_text;

pub mod customer;
pub mod item;
pub mod order;
pub mod payment;
pub mod shipping;
