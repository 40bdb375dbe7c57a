//! Health identifier codes and their QR rendering.

use std::sync::LazyLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{Datelike, Utc};
use qrcode::render::svg;
use qrcode::{EcLevel, QrCode};
use rand::Rng;
use regex::Regex;
use serde::Serialize;

/// Excludes the look-alikes 0/O and 1/I.
pub const HEALTH_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const HEALTH_CODE_PREFIX: &str = "HV";
pub const QR_PAYLOAD_TYPE: &str = "HEALTHVAULT_EMERGENCY";

static HEALTH_CODE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^HV-\d{4}-[A-Z0-9]{4}-[A-Z0-9]{4}$").expect("valid health code regex")
});

/// Source of candidate codes. Uniqueness is enforced by storage, not here.
pub trait HealthCodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// `HV-<current year>-XXXX-XXXX` from the thread RNG.
#[derive(Debug, Default)]
pub struct RandomHealthCodes;

impl HealthCodeGenerator for RandomHealthCodes {
    fn generate(&self) -> String {
        generate_health_code(Utc::now().year(), &mut rand::thread_rng())
    }
}

fn random_block(rng: &mut impl Rng) -> String {
    (0..4)
        .map(|_| HEALTH_CODE_ALPHABET[rng.gen_range(0..HEALTH_CODE_ALPHABET.len())] as char)
        .collect()
}

pub fn generate_health_code(year: i32, rng: &mut impl Rng) -> String {
    format!(
        "{HEALTH_CODE_PREFIX}-{year:04}-{}-{}",
        random_block(rng),
        random_block(rng)
    )
}

/// Shape check for codes arriving from outside (public lookup).
/// Accepts any uppercase alphanumerics, not only the generator alphabet.
pub fn is_valid_health_code(code: &str) -> bool {
    HEALTH_CODE_PATTERN.is_match(code)
}

#[derive(Debug, thiserror::Error)]
pub enum QrError {
    #[error("QR payload could not be serialized: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("QR generation failed: {0}")]
    Encode(#[from] qrcode::types::QrError),
}

/// Render `payload` as JSON inside a high-redundancy QR code and return it
/// as an SVG data URL.
pub fn render_qr_data_url<T: Serialize>(payload: &T) -> Result<String, QrError> {
    let json = serde_json::to_vec(payload)?;
    let code = QrCode::with_error_correction_level(&json, EcLevel::H)?;

    let svg_string = code
        .render::<svg::Color>()
        .min_dimensions(300, 300)
        .dark_color(svg::Color("#667eea"))
        .light_color(svg::Color("#ffffff"))
        .quiet_zone(true)
        .build();

    Ok(format!(
        "data:image/svg+xml;base64,{}",
        STANDARD.encode(svg_string)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn generated_codes_match_format_and_alphabet() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let code = generate_health_code(2025, &mut rng);
            assert!(is_valid_health_code(&code), "{code}");
            assert!(code.starts_with("HV-2025-"));
            for c in code[8..].chars().filter(|c| *c != '-') {
                assert!(HEALTH_CODE_ALPHABET.contains(&(c as u8)), "{c} in {code}");
            }
        }
    }

    #[test]
    fn alphabet_excludes_ambiguous_characters() {
        for c in [b'0', b'O', b'1', b'I'] {
            assert!(!HEALTH_CODE_ALPHABET.contains(&c));
        }
        assert_eq!(HEALTH_CODE_ALPHABET.len(), 32);
    }

    #[test]
    fn random_generator_uses_current_year() {
        let code = RandomHealthCodes.generate();
        assert!(code.starts_with(&format!("HV-{}-", Utc::now().year())));
    }

    #[test]
    fn shape_check_rejects_malformed_codes() {
        assert!(is_valid_health_code("HV-2024-ABCD-23EF"));
        assert!(!is_valid_health_code("hv-2024-abcd-23ef"));
        assert!(!is_valid_health_code("HV-24-ABCD-23EF"));
        assert!(!is_valid_health_code("HV-2024-ABCD-23EF "));
        assert!(!is_valid_health_code("HV-2024-ABCDE-23EF"));
        assert!(!is_valid_health_code(""));
    }

    #[test]
    fn qr_is_svg_data_url() {
        let url = render_qr_data_url(&serde_json::json!({
            "healthId": "HV-2025-ABCD-EFGH",
            "type": QR_PAYLOAD_TYPE,
        }))
        .unwrap();
        let encoded = url.strip_prefix("data:image/svg+xml;base64,").unwrap();
        let svg = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
        assert!(svg.contains("<svg"));
    }
}
