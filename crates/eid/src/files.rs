//! Logical files of the eID card
//!
//! Every readable file sits behind a fixed 6-byte path selector under the
//! master file. The table is static; there is nothing to negotiate with
//! the card.

use derive_more::Display;

/// Length of a file path selector
pub const FILE_ID_LEN: usize = 6;

/// Logical files readable from the card
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EidFile {
    /// Identity record
    #[display("/id/id")]
    Identity,
    /// Signature over the identity record
    #[display("/id/id_sgn")]
    IdentitySignature,
    /// Holder address
    #[display("/id/addr")]
    Address,
    /// Signature over the address
    #[display("/id/addr_sgn")]
    AddressSignature,
    /// Holder photo (JPEG)
    #[display("/id/photo")]
    Photo,
    /// Signature over the photo
    #[display("/id/photo_sgn")]
    PhotoSignature,
    /// Authentication certificate
    #[display("/mscp/ksc00")]
    AuthenticationCertificate,
    /// Non-repudiation (signing) certificate
    #[display("/mscp/ksc01")]
    SigningCertificate,
}

impl EidFile {
    /// The fixed 6-byte path selector of this file
    pub const fn file_id(self) -> [u8; FILE_ID_LEN] {
        match self {
            Self::Identity => [0x3F, 0x00, 0xDF, 0x01, 0x40, 0x31],
            Self::IdentitySignature => [0x3F, 0x00, 0xDF, 0x01, 0x40, 0x32],
            Self::Address => [0x3F, 0x00, 0xDF, 0x01, 0x40, 0x33],
            Self::AddressSignature => [0x3F, 0x00, 0xDF, 0x01, 0x40, 0x34],
            Self::Photo => [0x3F, 0x00, 0xDF, 0x01, 0x40, 0x35],
            Self::PhotoSignature => [0x3F, 0x00, 0xDF, 0x01, 0x40, 0x36],
            Self::AuthenticationCertificate => [0x3F, 0x00, 0xDF, 0x00, 0x50, 0x38],
            Self::SigningCertificate => [0x3F, 0x00, 0xDF, 0x00, 0x50, 0x39],
        }
    }

    /// Look a file up by its logical path
    pub fn from_path(path: &str) -> Option<Self> {
        match path {
            "/id/id" => Some(Self::Identity),
            "/id/id_sgn" => Some(Self::IdentitySignature),
            "/id/addr" => Some(Self::Address),
            "/id/addr_sgn" => Some(Self::AddressSignature),
            "/id/photo" => Some(Self::Photo),
            "/id/photo_sgn" => Some(Self::PhotoSignature),
            "/mscp/ksc00" => Some(Self::AuthenticationCertificate),
            "/mscp/ksc01" => Some(Self::SigningCertificate),
            _ => None,
        }
    }
}

/// Certificate kinds exposed by the card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertKind {
    /// Certificate used for authentication
    Authentication,
    /// Certificate used for qualified signatures
    Signing,
}

impl CertKind {
    /// The file holding this certificate
    pub const fn file(self) -> EidFile {
        match self {
            Self::Authentication => EidFile::AuthenticationCertificate,
            Self::Signing => EidFile::SigningCertificate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_round_trip() {
        for file in [
            EidFile::Identity,
            EidFile::IdentitySignature,
            EidFile::Address,
            EidFile::AddressSignature,
            EidFile::Photo,
            EidFile::PhotoSignature,
            EidFile::AuthenticationCertificate,
            EidFile::SigningCertificate,
        ] {
            assert_eq!(EidFile::from_path(&file.to_string()), Some(file));
        }
        assert_eq!(EidFile::from_path("/id/unknown"), None);
    }

    #[test]
    fn test_file_ids() {
        assert_eq!(
            EidFile::Identity.file_id(),
            [0x3F, 0x00, 0xDF, 0x01, 0x40, 0x31]
        );
        assert_eq!(
            EidFile::SigningCertificate.file_id(),
            [0x3F, 0x00, 0xDF, 0x00, 0x50, 0x39]
        );
    }

    #[test]
    fn test_certificate_files() {
        assert_eq!(
            CertKind::Authentication.file(),
            EidFile::AuthenticationCertificate
        );
        assert_eq!(CertKind::Signing.file(), EidFile::SigningCertificate);
    }
}
