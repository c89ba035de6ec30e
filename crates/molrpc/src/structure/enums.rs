//! Integer-coded enumerations carried on the wire as plain numbers.
//!
//! Decoding a value outside the declared range is an error, never a silent
//! fallback to a default variant.

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            Default,
            ::serde::Serialize,
            ::serde::Deserialize,
        )]
        #[serde(try_from = "i64", into = "i64")]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_raw(self) -> i64 {
                self as i64
            }
        }

        impl TryFrom<i64> for $name {
            type Error = String;

            fn try_from(value: i64) -> Result<Self, String> {
                match value {
                    $($value => Ok($name::$variant),)+
                    other => Err(format!(
                        "{} out of range: {}",
                        stringify!($name),
                        other
                    )),
                }
            }
        }

        impl From<$name> for i64 {
            fn from(value: $name) -> Self {
                value.as_raw()
            }
        }
    };
}

pub(crate) use wire_enum;

wire_enum! {
    /// How an atom is drawn.
    AtomRenderingMode {
        #[default]
        BallStick = 0,
        Stick = 1,
        Wire = 2,
        VanDerWaals = 3,
        Point = 4,
        BFactor = 5,
        Adaptive = 6,
    }
}

wire_enum! {
    RibbonMode {
        #[default]
        SecondaryStructure = 0,
        AdaptiveTube = 1,
        Coil = 2,
    }
}

wire_enum! {
    SecondaryStructure {
        #[default]
        Unknown = 0,
        Coil = 1,
        Sheet = 2,
        Helix = 3,
    }
}

wire_enum! {
    /// Bond order / kind.
    BondKind {
        Unknown = 0,
        #[default]
        CovalentSingle = 1,
        CovalentDouble = 2,
        CovalentTriple = 3,
        Aromatic = 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_values_roundtrip() {
        for kind in BondKind::ALL {
            assert_eq!(BondKind::try_from(kind.as_raw()).unwrap(), *kind);
        }
    }

    #[test]
    fn out_of_range_is_rejected() {
        let err = serde_json::from_value::<SecondaryStructure>(serde_json::json!(9)).unwrap_err();
        assert!(err.to_string().contains("out of range"), "{err}");
        assert!(RibbonMode::try_from(-1).is_err());
    }

    wire_enum! {
        Outcome {
            #[default]
            Ok = 0,
            Error = 1,
        }
    }

    #[test]
    fn variant_named_error_decodes() {
        assert_eq!(Outcome::try_from(1), Ok(Outcome::Error));
        assert_eq!(Outcome::try_from(2).unwrap_err(), "Outcome out of range: 2");
        let decoded: Outcome = serde_json::from_value(serde_json::json!(0)).unwrap();
        assert_eq!(decoded, Outcome::Ok);
    }
}
