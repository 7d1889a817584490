// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - SERDE ADAPTERS
//
// Arbitrary-precision amounts travel as decimal strings in JSON and TOML so
// every consumer round-trips them exactly. Integers are accepted on input for
// hand-written config files.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use num_bigint::{BigInt, BigUint};
use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::fmt;

/// `BigUint` ↔ decimal string.
pub mod decimal {
    use super::*;

    pub fn serialize<S: Serializer>(val: &BigUint, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&val.to_str_radix(10))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BigUint, D::Error> {
        struct BigUintVisitor;

        impl<'de> Visitor<'de> for BigUintVisitor {
            type Value = BigUint;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an unsigned integer as a decimal string or number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<BigUint, E> {
                BigUint::parse_bytes(v.as_bytes(), 10)
                    .ok_or_else(|| E::custom(format!("invalid unsigned decimal: {v}")))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<BigUint, E> {
                Ok(BigUint::from(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<BigUint, E> {
                u64::try_from(v)
                    .map(BigUint::from)
                    .map_err(|_| E::custom("negative value for unsigned amount"))
            }
        }

        d.deserialize_any(BigUintVisitor)
    }
}

/// `BigInt` ↔ signed decimal string.
pub mod signed_decimal {
    use super::*;

    pub fn serialize<S: Serializer>(val: &BigInt, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&val.to_str_radix(10))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BigInt, D::Error> {
        struct BigIntVisitor;

        impl<'de> Visitor<'de> for BigIntVisitor {
            type Value = BigInt;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an integer as a decimal string or number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<BigInt, E> {
                BigInt::parse_bytes(v.as_bytes(), 10)
                    .ok_or_else(|| E::custom(format!("invalid decimal: {v}")))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<BigInt, E> {
                Ok(BigInt::from(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<BigInt, E> {
                Ok(BigInt::from(v))
            }
        }

        d.deserialize_any(BigIntVisitor)
    }
}

/// `Option<Vec<u8>>` ↔ optional lowercase hex string.
pub mod hex_bytes_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(val: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match val {
            Some(bytes) => s.serialize_some(&hex::encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|h| hex::decode(h).map_err(serde::de::Error::custom))
            .transpose()
    }
}
