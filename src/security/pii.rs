// src/security/pii.rs
//! Pattern-driven PII detection with checksum validators and redaction.
//!
//! Detection is regex-first with declared confidence — this is scrubbing,
//! not authoritative classification. Checksummed types (SSN, cards, IBAN,
//! routing numbers) move ±0.2 on validator outcome.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("email regex");
    static ref URL_RE: Regex =
        Regex::new(r#"\bhttps?://[^\s<>"'),]+"#).expect("url regex");
    static ref IPV4_RE: Regex =
        Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("ipv4 regex");
    static ref IPV6_RE: Regex =
        Regex::new(r"\b(?:[0-9a-fA-F]{1,4}:){2,7}[0-9a-fA-F]{1,4}\b").expect("ipv6 regex");
    static ref SSN_RE: Regex = Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("ssn regex");
    static ref CREDIT_CARD_RE: Regex =
        Regex::new(r"\b\d(?:[ -]?\d){12,18}\b").expect("credit card regex");
    static ref PHONE_US_RE: Regex =
        Regex::new(r"\b(?:\+1[-. ]?)?\(?\d{3}\)?[-. ]\d{3}[-. ]\d{4}\b").expect("us phone regex");
    static ref PHONE_INTL_RE: Regex =
        Regex::new(r"\+\d{1,3}[-. ]?\d{2,4}(?:[-. ]?\d{2,4}){2,4}").expect("intl phone regex");
    static ref DATE_ISO_RE: Regex = Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").expect("iso date regex");
    static ref DATE_US_RE: Regex =
        Regex::new(r"\b\d{1,2}/\d{1,2}/\d{2,4}\b").expect("us date regex");
    static ref TIME_RE: Regex =
        Regex::new(r"\b\d{1,2}:\d{2}(?::\d{2})?(?:\s?[AaPp][Mm])?\b").expect("time regex");
    static ref BANK_ACCOUNT_RE: Regex =
        Regex::new(r"\b\d{10,17}\b").expect("bank account regex");
    static ref IBAN_RE: Regex =
        Regex::new(r"\b[A-Z]{2}\d{2}[A-Z0-9]{11,30}\b").expect("iban regex");
    static ref ROUTING_RE: Regex = Regex::new(r"\b\d{9}\b").expect("routing regex");
    static ref PASSPORT_RE: Regex = Regex::new(r"\b[A-Z]\d{8}\b").expect("passport regex");
    static ref DRIVERS_LICENSE_RE: Regex =
        Regex::new(r"\b[A-Z]{1,2}\d{6,7}\b").expect("license regex");
    static ref PERSON_NAME_RE: Regex =
        Regex::new(r"\b[A-Z][a-z]+ [A-Z][a-z]+\b").expect("name regex");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiType {
    Email,
    Url,
    IpV4,
    IpV6,
    Ssn,
    CreditCard,
    PhoneUs,
    PhoneIntl,
    DateIso,
    DateUs,
    Time,
    BankAccount,
    Iban,
    RoutingNumber,
    Passport,
    DriversLicense,
    PersonName,
}

impl PiiType {
    /// Uppercase label used by Replace-mode redaction, e.g. `[EMAIL]`.
    pub fn label(&self) -> &'static str {
        match self {
            PiiType::Email => "EMAIL",
            PiiType::Url => "URL",
            PiiType::IpV4 => "IP",
            PiiType::IpV6 => "IPV6",
            PiiType::Ssn => "SSN",
            PiiType::CreditCard => "CREDIT_CARD",
            PiiType::PhoneUs => "PHONE",
            PiiType::PhoneIntl => "PHONE",
            PiiType::DateIso => "DATE",
            PiiType::DateUs => "DATE",
            PiiType::Time => "TIME",
            PiiType::BankAccount => "BANK_ACCOUNT",
            PiiType::Iban => "IBAN",
            PiiType::RoutingNumber => "ROUTING_NUMBER",
            PiiType::Passport => "PASSPORT",
            PiiType::DriversLicense => "DRIVERS_LICENSE",
            PiiType::PersonName => "NAME",
        }
    }
}

/// Validator outcome tri-state: no validator, passed, failed.
type Validator = fn(&str) -> bool;

struct PiiPattern {
    pii_type: PiiType,
    regex: &'static Regex,
    base_confidence: f32,
    validator: Option<Validator>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiiMatch {
    pub pii_type: PiiType,
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub confidence: f32,
}

/// How redaction rewrites each span.
#[derive(Debug, Clone, PartialEq)]
pub enum RedactionMode {
    /// `[TYPE]`, or a fixed placeholder when `include_type` is false.
    Replace { include_type: bool },
    FullMask { mask_char: char },
    PartialMask {
        show_first: usize,
        show_last: usize,
        mask_char: char,
    },
    /// First 8 hex chars of the span's SHA-256.
    Hash,
    Remove,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Redaction {
    pub pii_type: PiiType,
    pub start: usize,
    pub original: String,
    pub replacement: String,
}

#[derive(Debug, Clone)]
pub struct RedactionResult {
    pub redacted: String,
    /// Ordered by original position, earliest first.
    pub redactions: Vec<Redaction>,
}

pub struct PiiDetector {
    patterns: Vec<PiiPattern>,
    /// Matches below this confidence are dropped before overlap
    /// resolution.
    min_confidence: f32,
}

impl PiiDetector {
    pub fn new() -> Self {
        Self::with_min_confidence(0.0)
    }

    pub fn with_min_confidence(min_confidence: f32) -> Self {
        Self {
            patterns: pattern_table(),
            min_confidence,
        }
    }

    /// Scan `text` and return non-overlapping matches ordered by start.
    /// Overlap resolution walks matches by start ascending then
    /// confidence descending, keeping a match only when none of its
    /// positions are already covered.
    pub fn detect(&self, text: &str) -> Vec<PiiMatch> {
        let mut raw: Vec<PiiMatch> = Vec::new();
        for pattern in &self.patterns {
            for m in pattern.regex.find_iter(text) {
                let confidence = match pattern.validator {
                    Some(validate) => {
                        if validate(m.as_str()) {
                            (pattern.base_confidence + 0.2).min(1.0)
                        } else {
                            (pattern.base_confidence - 0.2).max(0.0)
                        }
                    }
                    None => pattern.base_confidence,
                };
                if confidence < self.min_confidence {
                    continue;
                }
                raw.push(PiiMatch {
                    pii_type: pattern.pii_type,
                    start: m.start(),
                    end: m.end(),
                    text: m.as_str().to_string(),
                    confidence,
                });
            }
        }

        raw.sort_by(|a, b| {
            a.start.cmp(&b.start).then_with(|| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        });

        let mut kept: Vec<PiiMatch> = Vec::new();
        for candidate in raw {
            let overlaps = kept
                .iter()
                .any(|k| candidate.start < k.end && k.start < candidate.end);
            if !overlaps {
                kept.push(candidate);
            }
        }
        kept
    }

    /// Redact every detected span. Replacements are applied from the
    /// highest start offset down so earlier offsets stay valid; the log
    /// is returned in chronological (start-ascending) order.
    pub fn redact(&self, text: &str, mode: &RedactionMode) -> RedactionResult {
        let matches = self.detect(text);
        let mut redacted = text.to_string();
        let mut log: Vec<Redaction> = Vec::new();

        for m in matches.iter().rev() {
            let replacement = render_replacement(m, mode);
            redacted.replace_range(m.start..m.end, &replacement);
            log.push(Redaction {
                pii_type: m.pii_type,
                start: m.start,
                original: m.text.clone(),
                replacement,
            });
        }
        log.reverse();

        RedactionResult {
            redacted,
            redactions: log,
        }
    }
}

impl Default for PiiDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn render_replacement(m: &PiiMatch, mode: &RedactionMode) -> String {
    match mode {
        RedactionMode::Replace { include_type } => {
            if *include_type {
                format!("[{}]", m.pii_type.label())
            } else {
                "[REDACTED]".to_string()
            }
        }
        RedactionMode::FullMask { mask_char } => {
            mask_char.to_string().repeat(m.text.chars().count())
        }
        RedactionMode::PartialMask {
            show_first,
            show_last,
            mask_char,
        } => {
            let chars: Vec<char> = m.text.chars().collect();
            if chars.len() <= show_first + show_last {
                mask_char.to_string().repeat(chars.len())
            } else {
                let head: String = chars[..*show_first].iter().collect();
                let tail: String = chars[chars.len() - show_last..].iter().collect();
                let middle = mask_char
                    .to_string()
                    .repeat(chars.len() - show_first - show_last);
                format!("{head}{middle}{tail}")
            }
        }
        RedactionMode::Hash => hex::encode(Sha256::digest(m.text.as_bytes()))[..8].to_string(),
        RedactionMode::Remove => String::new(),
    }
}

fn pattern_table() -> Vec<PiiPattern> {
    vec![
        PiiPattern {
            pii_type: PiiType::Email,
            regex: &EMAIL_RE,
            base_confidence: 0.95,
            validator: None,
        },
        PiiPattern {
            pii_type: PiiType::Url,
            regex: &URL_RE,
            base_confidence: 0.70,
            validator: None,
        },
        PiiPattern {
            pii_type: PiiType::IpV4,
            regex: &IPV4_RE,
            base_confidence: 0.90,
            validator: Some(validate_ipv4),
        },
        PiiPattern {
            pii_type: PiiType::IpV6,
            regex: &IPV6_RE,
            base_confidence: 0.85,
            validator: None,
        },
        PiiPattern {
            pii_type: PiiType::Ssn,
            regex: &SSN_RE,
            base_confidence: 0.90,
            validator: Some(validate_ssn),
        },
        PiiPattern {
            pii_type: PiiType::CreditCard,
            regex: &CREDIT_CARD_RE,
            base_confidence: 0.80,
            validator: Some(validate_credit_card),
        },
        PiiPattern {
            pii_type: PiiType::PhoneUs,
            regex: &PHONE_US_RE,
            base_confidence: 0.85,
            validator: None,
        },
        PiiPattern {
            pii_type: PiiType::PhoneIntl,
            regex: &PHONE_INTL_RE,
            base_confidence: 0.75,
            validator: None,
        },
        PiiPattern {
            pii_type: PiiType::DateIso,
            regex: &DATE_ISO_RE,
            base_confidence: 0.60,
            validator: None,
        },
        PiiPattern {
            pii_type: PiiType::DateUs,
            regex: &DATE_US_RE,
            base_confidence: 0.50,
            validator: None,
        },
        PiiPattern {
            pii_type: PiiType::Time,
            regex: &TIME_RE,
            base_confidence: 0.50,
            validator: None,
        },
        PiiPattern {
            pii_type: PiiType::BankAccount,
            regex: &BANK_ACCOUNT_RE,
            base_confidence: 0.70,
            validator: None,
        },
        PiiPattern {
            pii_type: PiiType::Iban,
            regex: &IBAN_RE,
            base_confidence: 0.85,
            validator: Some(validate_iban),
        },
        PiiPattern {
            pii_type: PiiType::RoutingNumber,
            regex: &ROUTING_RE,
            base_confidence: 0.75,
            validator: Some(validate_routing),
        },
        PiiPattern {
            pii_type: PiiType::Passport,
            regex: &PASSPORT_RE,
            base_confidence: 0.60,
            validator: None,
        },
        PiiPattern {
            pii_type: PiiType::DriversLicense,
            regex: &DRIVERS_LICENSE_RE,
            base_confidence: 0.70,
            validator: None,
        },
        PiiPattern {
            pii_type: PiiType::PersonName,
            regex: &PERSON_NAME_RE,
            base_confidence: 0.40,
            validator: None,
        },
    ]
}

// ── Validators ────────────────────────────────────────────────────────────────

fn validate_ipv4(text: &str) -> bool {
    text.split('.')
        .all(|octet| octet.parse::<u16>().map(|v| v <= 255).unwrap_or(false))
}

/// SSN structure: 9 digits, area not 000/666/9xx, group not 00, serial
/// not 0000.
fn validate_ssn(text: &str) -> bool {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    if digits.len() != 9 {
        return false;
    }
    let area = &digits[0..3];
    let group = &digits[3..5];
    let serial = &digits[5..9];
    area != "000" && area != "666" && !area.starts_with('9') && group != "00" && serial != "0000"
}

/// Luhn check over 13–19 digits.
fn validate_credit_card(text: &str) -> bool {
    let digits: Vec<u32> = text.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

/// IBAN mod-97: rotate the first four characters to the end, map letters
/// to 10..35, and the big number must be ≡ 1 (mod 97).
fn validate_iban(text: &str) -> bool {
    if text.len() < 15 {
        return false;
    }
    let rearranged = format!("{}{}", &text[4..], &text[..4]);
    let mut remainder: u64 = 0;
    for c in rearranged.chars() {
        let value = match c {
            '0'..='9' => c as u64 - '0' as u64,
            'A'..='Z' => c as u64 - 'A' as u64 + 10,
            _ => return false,
        };
        remainder = if value >= 10 {
            (remainder * 100 + value) % 97
        } else {
            (remainder * 10 + value) % 97
        };
    }
    remainder == 1
}

/// ABA routing checksum: 3-7-1 weighting mod 10.
fn validate_routing(text: &str) -> bool {
    let digits: Vec<u32> = text.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 9 {
        return false;
    }
    let sum = 3 * (digits[0] + digits[3] + digits[6])
        + 7 * (digits[1] + digits[4] + digits[7])
        + (digits[2] + digits[5] + digits[8]);
    sum % 10 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(text: &str) -> Vec<PiiMatch> {
        PiiDetector::new().detect(text)
    }

    fn types_of(matches: &[PiiMatch]) -> Vec<PiiType> {
        matches.iter().map(|m| m.pii_type).collect()
    }

    // ============================================================================
    // Detection tests
    // ============================================================================

    #[test]
    fn test_detects_email_and_ssn() {
        let matches = detect("Email me at a@b.co, SSN 123-45-6789");
        let types = types_of(&matches);
        assert!(types.contains(&PiiType::Email));
        assert!(types.contains(&PiiType::Ssn));
    }

    #[test]
    fn test_valid_ssn_gains_confidence() {
        let matches = detect("ssn 123-45-6789");
        let ssn = matches
            .iter()
            .find(|m| m.pii_type == PiiType::Ssn)
            .unwrap();
        assert!((ssn.confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_ssn_loses_confidence() {
        let matches = detect("ssn 000-45-6789");
        let ssn = matches
            .iter()
            .find(|m| m.pii_type == PiiType::Ssn)
            .unwrap();
        assert!((ssn.confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_luhn_validates_known_card() {
        // Standard test PAN.
        assert!(validate_credit_card("4111 1111 1111 1111"));
        assert!(!validate_credit_card("4111 1111 1111 1112"));
    }

    #[test]
    fn test_ipv4_octet_range() {
        assert!(validate_ipv4("192.168.0.1"));
        assert!(!validate_ipv4("300.1.1.1"));
        let matches = detect("server at 10.0.0.7 responded");
        assert!(types_of(&matches).contains(&PiiType::IpV4));
    }

    #[test]
    fn test_iban_mod97() {
        assert!(validate_iban("GB82WEST12345698765432"));
        assert!(!validate_iban("GB82WEST12345698765431"));
    }

    #[test]
    fn test_routing_checksum() {
        // Federal Reserve routing number.
        assert!(validate_routing("021000021"));
        assert!(!validate_routing("021000022"));
    }

    #[test]
    fn test_person_name_is_low_confidence() {
        let matches = detect("I spoke with Marta Keller yesterday");
        let name = matches
            .iter()
            .find(|m| m.pii_type == PiiType::PersonName)
            .unwrap();
        assert!((name.confidence - 0.40).abs() < 1e-6);
    }

    #[test]
    fn test_clean_text_has_no_matches() {
        assert!(detect("nothing sensitive in here at all").is_empty());
    }

    // ============================================================================
    // Overlap resolution tests
    // ============================================================================

    #[test]
    fn test_no_two_spans_overlap() {
        let matches = detect(
            "Call +1 415-555-2671 or 415-555-2671, card 4111 1111 1111 1111, \
             visit https://example.com/a on 2024-03-01 at 10:30",
        );
        for (i, a) in matches.iter().enumerate() {
            for b in matches.iter().skip(i + 1) {
                assert!(
                    a.end <= b.start || b.end <= a.start,
                    "{:?} overlaps {:?}",
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn test_matches_ordered_by_start() {
        let matches = detect("a@b.co then 10.0.0.1 then 2020-01-01");
        let starts: Vec<usize> = matches.iter().map(|m| m.start).collect();
        let mut sorted = starts.clone();
        sorted.sort_unstable();
        assert_eq!(starts, sorted);
    }

    // ============================================================================
    // Redaction tests
    // ============================================================================

    #[test]
    fn test_replace_mode_with_type_labels() {
        let result = PiiDetector::new().redact(
            "Email me at a@b.co, SSN 123-45-6789",
            &RedactionMode::Replace { include_type: true },
        );
        assert_eq!(result.redacted, "Email me at [EMAIL], SSN [SSN]");
        assert_eq!(result.redactions.len(), 2);
        assert!(result.redactions[0].start < result.redactions[1].start);
    }

    #[test]
    fn test_full_mask_preserves_length() {
        let result = PiiDetector::new().redact(
            "mail a@b.co now",
            &RedactionMode::FullMask { mask_char: '*' },
        );
        assert_eq!(result.redacted, "mail ****** now");
    }

    #[test]
    fn test_partial_mask_shows_edges() {
        let result = PiiDetector::new().redact(
            "card 4111 1111 1111 1111 ok",
            &RedactionMode::PartialMask {
                show_first: 4,
                show_last: 4,
                mask_char: '#',
            },
        );
        assert!(result.redacted.contains("4111"));
        assert!(result.redacted.contains("1111 ok"));
        assert!(result.redacted.contains('#'));
    }

    #[test]
    fn test_hash_mode_is_eight_hex_chars() {
        let result = PiiDetector::new().redact("ping 10.0.0.1", &RedactionMode::Hash);
        let replacement = &result.redactions[0].replacement;
        assert_eq!(replacement.len(), 8);
        assert!(replacement.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_remove_mode_deletes_spans() {
        let result = PiiDetector::new().redact("contact a@b.co please", &RedactionMode::Remove);
        assert_eq!(result.redacted, "contact  please");
    }

    #[test]
    fn test_min_confidence_filters_weak_matches() {
        let detector = PiiDetector::with_min_confidence(0.5);
        let matches = detector.detect("met with Marta Keller");
        assert!(matches.is_empty());
    }

    // ============================================================================
    // Per-type coverage
    // ============================================================================

    #[test]
    fn test_detects_urls_without_trailing_punctuation() {
        let matches = detect("see https://docs.example.org/page, then reply");
        let url = matches
            .iter()
            .find(|m| m.pii_type == PiiType::Url)
            .unwrap();
        assert!(!url.text.ends_with(','));
    }

    #[test]
    fn test_detects_ipv6() {
        let matches = detect("listening on 2001:0db8:85a3:0000:0000:8a2e:0370:7334");
        assert!(types_of(&matches).contains(&PiiType::IpV6));
    }

    #[test]
    fn test_detects_international_phone() {
        let matches = detect("reach the office at +44 20 7946 0958");
        assert!(types_of(&matches)
            .iter()
            .any(|t| matches!(t, PiiType::PhoneIntl | PiiType::PhoneUs)));
    }

    #[test]
    fn test_detects_iso_and_us_dates_with_time() {
        let matches = detect("window opens 2025-01-31, closes 2/14/25 at 23:59");
        let types = types_of(&matches);
        assert!(types.contains(&PiiType::DateIso));
        assert!(types.contains(&PiiType::DateUs));
        assert!(types.contains(&PiiType::Time));
    }

    #[test]
    fn test_detects_bank_account_digits() {
        let matches = detect("wire to account 123456789012");
        assert!(types_of(&matches).contains(&PiiType::BankAccount));
    }

    #[test]
    fn test_detects_passport_and_license_shapes() {
        let passport = detect("passport C03005988 on file");
        assert!(types_of(&passport).contains(&PiiType::Passport));

        let license = detect("license D1234567 expires soon");
        assert!(types_of(&license)
            .iter()
            .any(|t| matches!(t, PiiType::DriversLicense | PiiType::Passport)));
    }

    #[test]
    fn test_invalid_ipv4_loses_confidence() {
        let matches = detect("bogus address 999.999.999.999");
        let ip = matches
            .iter()
            .find(|m| m.pii_type == PiiType::IpV4)
            .unwrap();
        assert!((ip.confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_failed_luhn_loses_confidence() {
        let matches = detect("card 4111 1111 1111 1112 maybe");
        let card = matches
            .iter()
            .find(|m| m.pii_type == PiiType::CreditCard)
            .unwrap();
        assert!((card.confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_ssn_edge_structures_rejected() {
        assert!(!validate_ssn("666-12-3456"));
        assert!(!validate_ssn("900-12-3456"));
        assert!(!validate_ssn("123-00-4567"));
        assert!(!validate_ssn("123-45-0000"));
        assert!(validate_ssn("223-45-6789"));
    }

    #[test]
    fn test_redaction_of_adjacent_spans_keeps_separators() {
        let result = PiiDetector::new().redact(
            "a@b.co 10.0.0.1",
            &RedactionMode::Replace { include_type: true },
        );
        assert_eq!(result.redacted, "[EMAIL] [IP]");
    }

    #[test]
    fn test_empty_input_yields_no_redactions() {
        let result =
            PiiDetector::new().redact("", &RedactionMode::Replace { include_type: true });
        assert_eq!(result.redacted, "");
        assert!(result.redactions.is_empty());
    }
}
