//! Protected health information (PHI) redaction.
//!
//! [`PhiRedactor`] scans free text with an ordered list of patterns and
//! replaces every match with a placeholder naming its kind, for example
//! `[REDACTED_EMAIL]`. Patterns run most specific first, so a card number
//! is never half-eaten by the phone matcher and an SSN is never mistaken for
//! two phone fragments.
//!
//! Every pattern requires at least one digit or an `@`, and no placeholder
//! contains either, so each pass that changes the text strictly shrinks the
//! set of candidate characters. [`PhiRedactor::redact`] repeats passes until
//! nothing matches, which makes it idempotent.
//!
//! ```
//! use medai_guard_audit::redact::PhiRedactor;
//!
//! let redactor = PhiRedactor::new();
//! let clean = redactor.redact("contact jane@example.org, SSN 123-45-6789");
//! assert_eq!(clean, "contact [REDACTED_EMAIL], SSN [REDACTED_SSN]");
//! assert!(!redactor.contains_sensitive(&clean));
//! ```

use std::{collections::BTreeSet, fmt, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of sensitive value a pattern detects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhiKind {
    /// Email address.
    Email,
    /// Payment card number (16 digits, optionally grouped).
    CreditCard,
    /// US social security number or similarly shaped government ID.
    Ssn,
    /// Labelled medical record number.
    Mrn,
    /// Date of birth.
    Dob,
    /// IPv4 address.
    Ipv4,
    /// Telephone number.
    Phone,
}

impl PhiKind {
    /// All kinds in matching order.
    pub const ALL: [PhiKind; 7] = [
        PhiKind::Email,
        PhiKind::CreditCard,
        PhiKind::Ssn,
        PhiKind::Mrn,
        PhiKind::Dob,
        PhiKind::Ipv4,
        PhiKind::Phone,
    ];

    /// Upper-case tag used in placeholders.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            PhiKind::Email => "EMAIL",
            PhiKind::CreditCard => "CREDIT_CARD",
            PhiKind::Ssn => "SSN",
            PhiKind::Mrn => "MRN",
            PhiKind::Dob => "DOB",
            PhiKind::Ipv4 => "IPV4",
            PhiKind::Phone => "PHONE",
        }
    }

    /// Replacement text for matches of this kind.
    #[must_use]
    pub fn placeholder(&self) -> &'static str {
        match self {
            PhiKind::Email => "[REDACTED_EMAIL]",
            PhiKind::CreditCard => "[REDACTED_CREDIT_CARD]",
            PhiKind::Ssn => "[REDACTED_SSN]",
            PhiKind::Mrn => "[REDACTED_MRN]",
            PhiKind::Dob => "[REDACTED_DOB]",
            PhiKind::Ipv4 => "[REDACTED_IPV4]",
            PhiKind::Phone => "[REDACTED_PHONE]",
        }
    }

    fn regex(&self) -> Option<&'static Regex> {
        let cell: &'static LazyLock<Option<Regex>> = match self {
            PhiKind::Email => &RE_EMAIL,
            PhiKind::CreditCard => &RE_CREDIT_CARD,
            PhiKind::Ssn => &RE_SSN,
            PhiKind::Mrn => &RE_MRN,
            PhiKind::Dob => &RE_DOB,
            PhiKind::Ipv4 => &RE_IPV4,
            PhiKind::Phone => &RE_PHONE,
        };
        cell.as_ref()
    }
}

impl fmt::Display for PhiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

macro_rules! phi_pattern {
    ($name:ident, $regex_str:expr) => {
        static $name: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new($regex_str).ok());
    };
}

// ── Email ──────────────────────────────────────────────────────────────────
phi_pattern!(RE_EMAIL, r"[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}");

// ── Credit card ───────────────────────────────────────────────────────────
phi_pattern!(RE_CREDIT_CARD, r"\b(?:\d{4}[-\s]?){3}\d{4}\b");

// ── SSN / government ID ───────────────────────────────────────────────────
phi_pattern!(RE_SSN, r"\b\d{3}-\d{2}-\d{4}\b");

// ── Medical record number ─────────────────────────────────────────────────
phi_pattern!(RE_MRN, r"(?i)\b(?:MRN|patient_id|PatientID)[\s:#=]*\d{5,}");

// ── Date of birth (labelled, or a strict MM/DD/YYYY date) ─────────────────
phi_pattern!(
    RE_DOB,
    r"(?i)\b(?:DOB|date_of_birth|birth_?date)[\s:=]*\d{1,2}[/\-]\d{1,2}[/\-]\d{2,4}\b|\b(?:0[1-9]|1[0-2])[/\-](?:0[1-9]|[12]\d|3[01])[/\-](?:19|20)\d{2}\b"
);

// ── IPv4 ───────────────────────────────────────────────────────────────────
phi_pattern!(RE_IPV4, r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b");

// ── Phone (US formats, optional +1) ───────────────────────────────────────
phi_pattern!(
    RE_PHONE,
    r"(?:\+1[-.\s]?)?\(?\b\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b|\b\d{3}[-.\s]\d{4}\b"
);

/// Ordered PHI scanner.
///
/// Stateless apart from the set of enabled kinds; cheap to clone.
#[derive(Debug, Clone)]
pub struct PhiRedactor {
    kinds: Vec<PhiKind>,
}

impl Default for PhiRedactor {
    fn default() -> Self {
        Self::new()
    }
}

impl PhiRedactor {
    /// Creates a redactor with every [`PhiKind`] enabled.
    #[must_use]
    pub fn new() -> Self {
        Self { kinds: PhiKind::ALL.to_vec() }
    }

    /// Creates a redactor limited to `kinds`, still applied in the
    /// canonical most-specific-first order.
    #[must_use]
    pub fn with_kinds(kinds: &[PhiKind]) -> Self {
        Self { kinds: PhiKind::ALL.into_iter().filter(|k| kinds.contains(k)).collect() }
    }

    fn patterns(&self) -> impl Iterator<Item = (PhiKind, &'static Regex)> + '_ {
        self.kinds.iter().filter_map(|k| k.regex().map(|re| (*k, re)))
    }

    /// One ordered pass; records every kind that replaced something.
    fn pass(&self, text: &str, found: &mut BTreeSet<PhiKind>) -> Option<String> {
        let mut current: Option<String> = None;
        for (kind, re) in self.patterns() {
            let input = current.as_deref().unwrap_or(text);
            if re.is_match(input) {
                found.insert(kind);
                current = Some(re.replace_all(input, kind.placeholder()).into_owned());
            }
        }
        current
    }

    fn scan(&self, text: &str) -> (String, BTreeSet<PhiKind>) {
        let mut found = BTreeSet::new();
        let mut current = text.to_owned();
        while let Some(next) = self.pass(&current, &mut found) {
            current = next;
        }
        (current, found)
    }

    /// Replaces every sensitive substring with its placeholder.
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        self.scan(text).0
    }

    /// Returns `true` if any enabled pattern matches.
    #[must_use]
    pub fn contains_sensitive(&self, text: &str) -> bool {
        self.patterns().any(|(_, re)| re.is_match(text))
    }

    /// Returns the kinds found in `text`, attributing each span to the
    /// first pattern that claims it.
    #[must_use]
    pub fn classify(&self, text: &str) -> BTreeSet<PhiKind> {
        self.scan(text).1
    }

    /// Redacts every key and string value inside a JSON object, recursing
    /// into nested arrays and objects.
    ///
    /// Keys that redact to the same text are kept apart with a numeric
    /// suffix (`[REDACTED_EMAIL]`, `[REDACTED_EMAIL]#2`, ...).
    ///
    /// Returns the redacted map and whether anything was replaced.
    #[must_use]
    pub fn redact_map(&self, map: &Map<String, Value>) -> (Map<String, Value>, bool) {
        let mut changed = false;
        let out = self.redact_object(map, &mut changed);
        (out, changed)
    }

    fn redact_object(&self, obj: &Map<String, Value>, changed: &mut bool) -> Map<String, Value> {
        let mut out = Map::new();
        for (key, value) in obj {
            let value = self.redact_value(value, changed);
            let redacted = self.redact(key);
            if redacted == *key {
                out.insert(redacted, value);
                continue;
            }
            *changed = true;
            let mut unique = redacted.clone();
            let mut n = 2;
            while out.contains_key(&unique) || obj.contains_key(&unique) {
                unique = format!("{redacted}#{n}");
                n += 1;
            }
            out.insert(unique, value);
        }
        out
    }

    fn redact_value(&self, value: &Value, changed: &mut bool) -> Value {
        match value {
            Value::String(s) => {
                let redacted = self.redact(s);
                if redacted != *s {
                    *changed = true;
                }
                Value::String(redacted)
            },
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.redact_value(v, changed)).collect())
            },
            Value::Object(obj) => Value::Object(self.redact_object(obj, changed)),
            other => other.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    #[test]
    fn all_patterns_compile() {
        for kind in PhiKind::ALL {
            assert!(kind.regex().is_some(), "{kind} pattern failed to compile");
        }
    }

    #[test]
    fn redacts_each_kind() {
        let r = PhiRedactor::new();
        let cases = [
            ("mail john.doe+x@clinic.example.com now", "mail [REDACTED_EMAIL] now"),
            ("card 4111 1111 1111 1111 ok", "card [REDACTED_CREDIT_CARD] ok"),
            ("card 4111-1111-1111-1111", "card [REDACTED_CREDIT_CARD]"),
            ("ssn 123-45-6789.", "ssn [REDACTED_SSN]."),
            ("MRN: 00123456 admitted", "[REDACTED_MRN] admitted"),
            ("patient_id=987654", "[REDACTED_MRN]"),
            ("DOB: 4/7/1982", "[REDACTED_DOB]"),
            ("born 07/04/1976", "born [REDACTED_DOB]"),
            ("from 192.168.10.4", "from [REDACTED_IPV4]"),
            ("call (555) 123-4567", "call [REDACTED_PHONE]"),
            ("call +1 555.123.4567", "call [REDACTED_PHONE]"),
            ("ext 555-1234", "ext [REDACTED_PHONE]"),
        ];
        for (input, expected) in cases {
            assert_eq!(r.redact(input), expected, "input: {input}");
        }
    }

    #[test]
    fn specific_patterns_win() {
        let r = PhiRedactor::new();
        assert_eq!(r.classify("4111111111111111"), BTreeSet::from([PhiKind::CreditCard]));
        assert_eq!(r.classify("123-45-6789"), BTreeSet::from([PhiKind::Ssn]));
        assert_eq!(r.classify("a1@b2.io"), BTreeSet::from([PhiKind::Email]));
    }

    #[test]
    fn leaves_clean_text_alone() {
        let r = PhiRedactor::new();
        let text = "inference completed for study ABC in 42 ms";
        assert_eq!(r.redact(text), text);
        assert!(!r.contains_sensitive(text));
        assert!(r.classify(text).is_empty());
    }

    #[test]
    fn classify_reports_every_kind_present() {
        let r = PhiRedactor::new();
        let kinds = r.classify("x@y.org from 10.0.0.1, SSN 123-45-6789");
        assert_eq!(kinds, BTreeSet::from([PhiKind::Email, PhiKind::Ssn, PhiKind::Ipv4]));
    }

    #[test]
    fn with_kinds_limits_scope() {
        let r = PhiRedactor::with_kinds(&[PhiKind::Email]);
        assert_eq!(r.redact("a@b.com 123-45-6789"), "[REDACTED_EMAIL] 123-45-6789");
    }

    #[test]
    fn redact_map_recurses() {
        let r = PhiRedactor::new();
        let map = json!({
            "note": "reach me at a@b.com",
            "count": 3,
            "nested": {"ip": "10.1.2.3", "list": ["ok", "555-123-4567"]},
        });
        let (out, changed) = r.redact_map(map.as_object().unwrap());
        assert!(changed);
        assert_eq!(
            Value::Object(out),
            json!({
                "note": "reach me at [REDACTED_EMAIL]",
                "count": 3,
                "nested": {"ip": "[REDACTED_IPV4]", "list": ["ok", "[REDACTED_PHONE]"]},
            })
        );

        let clean = json!({"model": "resnet50"});
        let (_, changed) = r.redact_map(clean.as_object().unwrap());
        assert!(!changed);
    }

    #[test]
    fn redact_map_scrubs_keys() {
        let r = PhiRedactor::new();
        let map = json!({
            "a@b.com": "viewed",
            "c@d.org": "exported",
            "study": {"10.0.0.7": true},
        });
        let (out, changed) = r.redact_map(map.as_object().unwrap());
        assert!(changed);
        assert_eq!(
            Value::Object(out.clone()),
            json!({
                "[REDACTED_EMAIL]": "viewed",
                "[REDACTED_EMAIL]#2": "exported",
                "study": {"[REDACTED_IPV4]": true},
            })
        );
        let (again, changed) = r.redact_map(&out);
        assert!(!changed);
        assert_eq!(again, out);
    }

    proptest! {
        #[test]
        fn redaction_is_idempotent(text in ".{0,200}") {
            let r = PhiRedactor::new();
            let once = r.redact(&text);
            prop_assert_eq!(r.redact(&once), once.clone());
            prop_assert!(!r.contains_sensitive(&once));
        }

        #[test]
        fn redaction_is_idempotent_on_numeric_soup(text in "[0-9 .()+@a-z/:-]{0,120}") {
            let r = PhiRedactor::new();
            let once = r.redact(&text);
            prop_assert_eq!(r.redact(&once), once.clone());
            prop_assert!(!r.contains_sensitive(&once));
        }
    }
}
