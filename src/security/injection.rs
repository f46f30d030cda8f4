// src/security/injection.rs
//! Prompt-injection scoring and neutralization.
//!
//! Matching runs on NFC-normalized text with case-insensitive rules;
//! sanitization rewrites the same text, so match offsets are always
//! valid for the text being edited.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// Zero-width and direction-fiddling characters used for token smuggling.
const INVISIBLE_CHARS: &[char] = &[
    '\u{200B}', '\u{200C}', '\u{200D}', '\u{FEFF}', '\u{180E}', '\u{2060}', '\u{00AD}',
    '\u{200E}', '\u{200F}',
];

/// Delimiter tokens escaped by the optional pre-pass.
const DELIMITER_TOKENS: &[&str] = &["```", "---", "###", "<<<", ">>>", "[INST]", "<|", "|>"];

lazy_static! {
    static ref OVERRIDE_RE: Regex = Regex::new(
        r"(?i)\b(ignore|disregard|forget)\s+(all\s+|any\s+)?(previous|prior|above|earlier)\s+(instructions|prompts|rules|directions|context)"
    )
    .expect("override regex");
    static ref JAILBREAK_RE: Regex = Regex::new(
        r"(?i)\b(jailbreak|dan\s+mode|developer\s+mode|do\s+anything\s+now|no\s+restrictions\s+apply|without\s+any\s+(filter|restriction)s?)"
    )
    .expect("jailbreak regex");
    static ref ROLE_RE: Regex = Regex::new(
        r"(?i)\b(you\s+are\s+now\s+(a|an|the)\b|pretend\s+to\s+be\b|act\s+as\s+(a|an|if\s+you)\b|assume\s+the\s+role\s+of\b)"
    )
    .expect("role regex");
    static ref EXFIL_RE: Regex = Regex::new(
        r"(?i)\b(reveal|show|print|repeat|output|leak)\s+(your|the)\s+(system\s+)?(prompt|instructions|rules|configuration)"
    )
    .expect("exfil regex");
    static ref DELIMITER_RE: Regex = Regex::new(
        r"(?i)(```|---|###|<<<|>>>|\[inst\]|\[/inst\]|<\|[a-z_]+\|>)"
    )
    .expect("delimiter regex");
    static ref RESET_RE: Regex = Regex::new(
        r"(?i)\b(forget\s+everything|start\s+over\s+from\s+scratch|reset\s+(the\s+)?(conversation|context|session)|begin\s+a\s+new\s+session)"
    )
    .expect("reset regex");
    static ref LEAKAGE_RE: Regex = Regex::new(
        r"(?i)\b(what\s+(are|were)\s+your\s+(instructions|rules)|initial\s+prompt|system\s+message\s+says)"
    )
    .expect("leakage regex");
    static ref BASE64_RE: Regex =
        Regex::new(r"\b[A-Za-z0-9+/]{40,}={0,2}\b").expect("base64 regex");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionType {
    InstructionOverride,
    Jailbreak,
    RoleManipulation,
    DataExfiltration,
    DelimiterAttack,
    ContextReset,
    PromptLeakage,
    Base64Payload,
    TokenSmuggling,
}

impl InjectionType {
    pub fn label(&self) -> &'static str {
        match self {
            InjectionType::InstructionOverride => "INSTRUCTION_OVERRIDE",
            InjectionType::Jailbreak => "JAILBREAK",
            InjectionType::RoleManipulation => "ROLE_MANIPULATION",
            InjectionType::DataExfiltration => "DATA_EXFILTRATION",
            InjectionType::DelimiterAttack => "DELIMITER_ATTACK",
            InjectionType::ContextReset => "CONTEXT_RESET",
            InjectionType::PromptLeakage => "PROMPT_LEAKAGE",
            InjectionType::Base64Payload => "BASE64_PAYLOAD",
            InjectionType::TokenSmuggling => "TOKEN_SMUGGLING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: f32) -> Self {
        if score >= 0.8 {
            RiskLevel::Critical
        } else if score >= 0.6 {
            RiskLevel::High
        } else if score >= 0.3 {
            RiskLevel::Medium
        } else if score > 0.0 {
            RiskLevel::Low
        } else {
            RiskLevel::None
        }
    }
}

struct InjectionRule {
    injection_type: InjectionType,
    regex: &'static Regex,
    confidence: f32,
    risk_weight: f32,
    description: &'static str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionMatch {
    pub injection_type: InjectionType,
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub confidence: f32,
    pub risk_weight: f32,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct InjectionAnalysis {
    pub risk_score: f32,
    pub risk_level: RiskLevel,
    pub matches: Vec<InjectionMatch>,
}

/// What to do with matched spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanitizeMode {
    /// Replace each span with `[user_input: <TYPE>]`.
    Neutralize,
    /// Delete each span.
    Remove,
    /// Refuse the whole text.
    Block,
    /// Leave spans in place but wrap the text in a data envelope.
    Escape,
}

#[derive(Debug, Clone)]
pub struct SanitizeOptions {
    pub mode: SanitizeMode,
    pub strip_invisible: bool,
    pub fold_homoglyphs: bool,
    pub escape_delimiters: bool,
    /// Prepended to the sanitized output when set.
    pub data_prefix: Option<String>,
    pub max_length: Option<usize>,
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        Self {
            mode: SanitizeMode::Neutralize,
            strip_invisible: true,
            fold_homoglyphs: true,
            escape_delimiters: false,
            data_prefix: None,
            max_length: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SanitizeResult {
    pub text: String,
    pub was_blocked: bool,
    pub was_modified: bool,
    pub analysis: InjectionAnalysis,
}

pub struct InjectionDetector {
    rules: Vec<InjectionRule>,
}

impl InjectionDetector {
    pub fn new() -> Self {
        Self { rules: rule_table() }
    }

    /// Score a text. Each rule contributes its risk weight once no matter
    /// how often it fires; the sum is clamped to [0, 1].
    pub fn analyze(&self, text: &str) -> InjectionAnalysis {
        let normalized: String = text.nfc().collect();
        let mut matches = Vec::new();
        let mut risk = 0.0f32;

        for rule in &self.rules {
            let mut fired = false;
            for m in rule.regex.find_iter(&normalized) {
                fired = true;
                matches.push(InjectionMatch {
                    injection_type: rule.injection_type,
                    start: m.start(),
                    end: m.end(),
                    text: m.as_str().to_string(),
                    confidence: rule.confidence,
                    risk_weight: rule.risk_weight,
                    description: rule.description.to_string(),
                });
            }
            if fired {
                risk += rule.risk_weight;
            }
        }

        if let Some(span) = find_invisible_span(&normalized) {
            matches.push(InjectionMatch {
                injection_type: InjectionType::TokenSmuggling,
                start: span.0,
                end: span.1,
                text: normalized[span.0..span.1].to_string(),
                confidence: 0.8,
                risk_weight: 0.2,
                description: "invisible characters embedded in text".to_string(),
            });
            risk += 0.2;
        }

        matches.sort_by_key(|m| m.start);
        let risk_score = risk.clamp(0.0, 1.0);
        InjectionAnalysis {
            risk_score,
            risk_level: RiskLevel::from_score(risk_score),
            matches,
        }
    }

    /// Pre-pass, analyze, then apply the selected mode. Match spans are
    /// rewritten from the highest start offset down.
    pub fn sanitize(&self, text: &str, opts: &SanitizeOptions) -> SanitizeResult {
        let mut working: String = text.nfc().collect();
        if opts.strip_invisible {
            working.retain(|c| !INVISIBLE_CHARS.contains(&c));
        }
        if opts.fold_homoglyphs {
            working = fold_homoglyphs(&working);
        }
        if opts.escape_delimiters {
            for token in DELIMITER_TOKENS {
                if working.contains(token) {
                    working = working.replace(token, &format!("\\{token}"));
                }
            }
        }

        let analysis = self.analyze(&working);
        let mut was_modified = working != text;

        let mut out = working;
        match opts.mode {
            SanitizeMode::Block => {
                if analysis.risk_score > 0.0 {
                    return SanitizeResult {
                        text: String::new(),
                        was_blocked: true,
                        was_modified: true,
                        analysis,
                    };
                }
            }
            SanitizeMode::Neutralize => {
                for m in non_overlapping(&analysis.matches).iter().rev() {
                    let replacement =
                        format!("[user_input: {}]", m.injection_type.label());
                    out.replace_range(m.start..m.end, &replacement);
                    was_modified = true;
                }
            }
            SanitizeMode::Remove => {
                for m in non_overlapping(&analysis.matches).iter().rev() {
                    out.replace_range(m.start..m.end, "");
                    was_modified = true;
                }
            }
            SanitizeMode::Escape => {
                out = format!("<<<user_data\n{out}\nuser_data>>>");
                was_modified = true;
            }
        }

        if let Some(prefix) = &opts.data_prefix {
            out = format!("{prefix}{out}");
            was_modified = true;
        }
        if let Some(max) = opts.max_length {
            if out.chars().count() > max {
                out = out.chars().take(max).collect();
                was_modified = true;
            }
        }

        SanitizeResult {
            text: out,
            was_blocked: false,
            was_modified,
            analysis,
        }
    }
}

impl Default for InjectionDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn rule_table() -> Vec<InjectionRule> {
    vec![
        InjectionRule {
            injection_type: InjectionType::InstructionOverride,
            regex: &OVERRIDE_RE,
            confidence: 0.9,
            risk_weight: 0.8,
            description: "attempts to override standing instructions",
        },
        InjectionRule {
            injection_type: InjectionType::Jailbreak,
            regex: &JAILBREAK_RE,
            confidence: 0.85,
            risk_weight: 0.7,
            description: "known jailbreak phrasing",
        },
        InjectionRule {
            injection_type: InjectionType::RoleManipulation,
            regex: &ROLE_RE,
            confidence: 0.7,
            risk_weight: 0.5,
            description: "tries to reassign the assistant's role",
        },
        InjectionRule {
            injection_type: InjectionType::DataExfiltration,
            regex: &EXFIL_RE,
            confidence: 0.85,
            risk_weight: 0.7,
            description: "asks for the hidden prompt or rules",
        },
        InjectionRule {
            injection_type: InjectionType::DelimiterAttack,
            regex: &DELIMITER_RE,
            confidence: 0.6,
            risk_weight: 0.25,
            description: "prompt-structure delimiter tokens",
        },
        InjectionRule {
            injection_type: InjectionType::ContextReset,
            regex: &RESET_RE,
            confidence: 0.7,
            risk_weight: 0.5,
            description: "tries to wipe conversational state",
        },
        InjectionRule {
            injection_type: InjectionType::PromptLeakage,
            regex: &LEAKAGE_RE,
            confidence: 0.7,
            risk_weight: 0.5,
            description: "probes for prompt contents",
        },
        InjectionRule {
            injection_type: InjectionType::Base64Payload,
            regex: &BASE64_RE,
            confidence: 0.5,
            risk_weight: 0.15,
            description: "long base64-looking blob",
        },
    ]
}

/// Matches filtered to disjoint spans (input is start-sorted). Rewrites
/// would corrupt offsets if two spans intersected.
fn non_overlapping(matches: &[InjectionMatch]) -> Vec<InjectionMatch> {
    let mut kept: Vec<InjectionMatch> = Vec::new();
    for m in matches {
        if kept
            .iter()
            .all(|k| m.end <= k.start || k.end <= m.start)
        {
            kept.push(m.clone());
        }
    }
    kept
}

/// First run of invisible characters, as a byte span.
fn find_invisible_span(text: &str) -> Option<(usize, usize)> {
    let mut start = None;
    for (idx, c) in text.char_indices() {
        if INVISIBLE_CHARS.contains(&c) {
            let s = *start.get_or_insert(idx);
            let end = idx + c.len_utf8();
            // Extend while the run continues; a single char is enough to flag.
            if text[end..]
                .chars()
                .next()
                .map(|n| !INVISIBLE_CHARS.contains(&n))
                .unwrap_or(true)
            {
                return Some((s, end));
            }
        } else {
            start = None;
        }
    }
    None
}

/// Fold common confusables to their ASCII look-alikes: Cyrillic
/// lookalike letters and fullwidth ASCII.
fn fold_homoglyphs(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'а' => 'a',
            'е' => 'e',
            'о' => 'o',
            'р' => 'p',
            'с' => 'c',
            'х' => 'x',
            'у' => 'y',
            'і' => 'i',
            'ѕ' => 's',
            'А' => 'A',
            'В' => 'B',
            'Е' => 'E',
            'К' => 'K',
            'М' => 'M',
            'Н' => 'H',
            'О' => 'O',
            'Р' => 'P',
            'С' => 'C',
            'Т' => 'T',
            'Х' => 'X',
            '\u{FF01}'..='\u{FF5E}' => {
                char::from_u32(c as u32 - 0xFEE0).unwrap_or(c)
            }
            _ => c,
        })
        .collect()
}
