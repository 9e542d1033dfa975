//! IR Type Handles and Secure Type Classification
//!
//! Types are identified by their canonical name, exactly as the host type system prints
//! them. The optimizer never inspects a type's structure; it only asks a [`TypeOracle`]
//! whether a type is expensive to combine in a binary operation, and whether an
//! encrypted tensor holds ciphertexts or plaintexts.
//!
//! # Classification
//! [`SecureTypes`] recognises secure containers by canonical-name prefix:
//! - secret-shared tensors
//! - homomorphically encrypted tensors (ciphertensors)
//! - multiparty partition, aggregate and union containers
//!
//! A ciphertensor is cipher-encrypted if its name mentions the CKKS ciphertext type,
//! and plaintext-encrypted if it mentions the CKKS plaintext type.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const SHARETENSOR_TYPE_NAME: &str = "std.sequre.types.sharetensor.Sharetensor";
pub const CIPHERTENSOR_TYPE_NAME: &str = "std.sequre.types.ciphertensor.Ciphertensor";
pub const MPP_TYPE_NAME: &str = "std.sequre.types.multiparty_partition.MPP";
pub const MPA_TYPE_NAME: &str = "std.sequre.types.multiparty_aggregate.MPA";
pub const MPU_TYPE_NAME: &str = "std.sequre.types.multiparty_union.MPU";
pub const CKKS_CIPHERTEXT_TYPE_NAME: &str = "std.sequre.lattiseq.ckks.Ciphertext";
pub const CKKS_PLAINTEXT_TYPE_NAME: &str = "std.sequre.lattiseq.ckks.Plaintext";

/// Canonical name of the integer constant type.
pub const INT_TYPE_NAME: &str = "int";
/// Canonical name of the floating-point constant type.
pub const FLOAT_TYPE_NAME: &str = "float";

/// A realized IR type, identified by its canonical name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IrType {
    name: String,
}

impl IrType {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn int() -> Self {
        Self::new(INT_TYPE_NAME)
    }

    pub fn float() -> Self {
        Self::new(FLOAT_TYPE_NAME)
    }

    /// Canonical type name (written verbatim into tree encodings).
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Expensive-value oracle.
///
/// Supplied by the host; the rewriters depend on it but never define what counts
/// as expensive.
pub trait TypeOracle {
    /// Is a value of this type costly to combine in a binary operation?
    fn is_secure_container(&self, ty: &IrType) -> bool;

    /// Is this type a homomorphically encrypted tensor?
    fn is_ciphertensor(&self, ty: &IrType) -> bool;

    /// Ciphertensor holding CKKS ciphertexts.
    fn is_cipher_ciphertensor(&self, ty: &IrType) -> bool {
        self.is_ciphertensor(ty) && ty.name().contains(CKKS_CIPHERTEXT_TYPE_NAME)
    }

    /// Ciphertensor holding CKKS plaintexts.
    fn is_plain_ciphertensor(&self, ty: &IrType) -> bool {
        self.is_ciphertensor(ty) && ty.name().contains(CKKS_PLAINTEXT_TYPE_NAME)
    }
}

/// Default classifier matching the secure container types by name prefix.
#[derive(Debug, Clone, Default)]
pub struct SecureTypes {
    /// Additional prefixes that mark a type as a secure container.
    extra_prefixes: Vec<String>,
}

impl SecureTypes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat types whose name starts with any of `prefixes` as secure containers too.
    pub fn with_extra_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_prefixes.extend(prefixes.into_iter().map(Into::into));
        self
    }

    pub fn is_sharetensor(&self, ty: &IrType) -> bool {
        ty.name().starts_with(SHARETENSOR_TYPE_NAME)
    }

    /// Multiparty partition, aggregate or union container.
    pub fn is_multiparty(&self, ty: &IrType) -> bool {
        let name = ty.name();
        name.starts_with(MPP_TYPE_NAME) || name.starts_with(MPA_TYPE_NAME) || name.starts_with(MPU_TYPE_NAME)
    }
}

impl TypeOracle for SecureTypes {
    fn is_secure_container(&self, ty: &IrType) -> bool {
        self.is_sharetensor(ty)
            || self.is_ciphertensor(ty)
            || self.is_multiparty(ty)
            || self.extra_prefixes.iter().any(|prefix| ty.name().starts_with(prefix.as_str()))
    }

    fn is_ciphertensor(&self, ty: &IrType) -> bool {
        ty.name().starts_with(CIPHERTENSOR_TYPE_NAME)
    }
}
