use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};

const VERIFIER_BYTES: usize = 64;

#[derive(Debug, Clone)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    pub fn generate() -> Self {
        let mut bytes = [0u8; VERIFIER_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::from_verifier(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn from_verifier(verifier: String) -> Self {
        let challenge = challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

/// base64url sin padding de SHA-256(verifier)
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc7636_vector() {
        let pkce = Pkce::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".into());
        assert_eq!(pkce.challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn generated_pair_is_consistent() {
        let pkce = Pkce::generate();
        assert_eq!(pkce.challenge, challenge_for(&pkce.verifier));
        assert!(!pkce.verifier.contains('='));
        assert!(!pkce.challenge.contains('='));
        assert!(!pkce.verifier.contains('+') && !pkce.verifier.contains('/'));
        // 64 bytes -> 86 caracteres
        assert_eq!(pkce.verifier.len(), 86);
        assert_eq!(pkce.challenge.len(), 43);
    }

    #[test]
    fn verifiers_are_random() {
        assert_ne!(Pkce::generate().verifier, Pkce::generate().verifier);
    }
}
