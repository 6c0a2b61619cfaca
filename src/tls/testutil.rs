//! Test PKI fixtures generated with rcgen
//!
//! Shared between unit tests and the integration tests under `tests/`.

#![allow(dead_code)]

use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use rcgen::{
    date_time_ymd, BasicConstraints, Certificate, CertificateParams,
    CertificateRevocationListParams, DnType, IsCa, KeyIdMethod, KeyPair, KeyUsagePurpose,
    RevocationReason, RevokedCertParams, SerialNumber,
};

/// Certificate authority able to issue leaves and CRLs
pub struct Pki {
    ca: Certificate,
    ca_key: KeyPair,
}

/// End-entity certificate with its private key
pub struct Leaf {
    cert: Certificate,
    key: KeyPair,
}

impl Pki {
    pub fn new(common_name: &str) -> Self {
        let ca_key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params
            .distinguished_name
            .push(DnType::CommonName, common_name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        params.serial_number = Some(SerialNumber::from(1u64));
        let ca = params.self_signed(&ca_key).unwrap();
        Pki { ca, ca_key }
    }

    pub fn ca_x509(&self) -> X509 {
        X509::from_der(self.ca.der()).unwrap()
    }

    pub fn ca_pem(&self) -> String {
        self.ca.pem()
    }

    /// Issue a leaf for `dns_name` with the given serial
    pub fn leaf(&self, dns_name: &str, serial: u64) -> Leaf {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec![dns_name.to_string()]).unwrap();
        params.distinguished_name.push(DnType::CommonName, dns_name);
        params.serial_number = Some(SerialNumber::from(serial));
        let cert = params.signed_by(&key, &self.ca, &self.ca_key).unwrap();
        Leaf { cert, key }
    }

    /// Issue a CRL revoking the given serials
    pub fn crl(&self, serials: &[u64]) -> Crl {
        let params = CertificateRevocationListParams {
            this_update: date_time_ymd(2024, 1, 1),
            next_update: date_time_ymd(2099, 1, 1),
            crl_number: SerialNumber::from(1u64),
            issuing_distribution_point: None,
            revoked_certs: serials
                .iter()
                .map(|serial| RevokedCertParams {
                    serial_number: SerialNumber::from(*serial),
                    revocation_time: date_time_ymd(2024, 1, 1),
                    reason_code: Some(RevocationReason::KeyCompromise),
                    invalidity_date: None,
                })
                .collect(),
            key_identifier_method: KeyIdMethod::Sha256,
        };
        let crl = params.signed_by(&self.ca, &self.ca_key).unwrap();
        Crl {
            der: crl.der().to_vec(),
            pem: crl.pem().unwrap(),
        }
    }
}

impl Leaf {
    pub fn x509(&self) -> X509 {
        X509::from_der(self.cert.der()).unwrap()
    }

    pub fn cert_pem(&self) -> String {
        self.cert.pem()
    }

    pub fn key_pem(&self) -> String {
        self.key.serialize_pem()
    }

    pub fn pkey(&self) -> PKey<Private> {
        PKey::private_key_from_pem(self.key_pem().as_bytes()).unwrap()
    }
}

/// Encoded CRL
pub struct Crl {
    pub der: Vec<u8>,
    pub pem: String,
}
