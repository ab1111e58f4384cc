use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use jobagg_core::{collapse_whitespace, IdentityKey, NormalizedRecord, RawFieldSet};
use thiserror::Error;

pub const DEFAULT_LOCATION: &str = "India";
pub const DEFAULT_MAX_SKILLS: usize = 12;

pub const DEFAULT_SKILL_TERMS: [&str; 28] = [
    "SIEM",
    "CISSP",
    "CEH",
    "CISA",
    "CISM",
    "AWS",
    "Azure",
    "Python",
    "Splunk",
    "QRadar",
    "Nessus",
    "Metasploit",
    "Burp Suite",
    "Wireshark",
    "Firewall",
    "IDS/IPS",
    "PKI",
    "LDAP",
    "Active Directory",
    "SOX",
    "PCI DSS",
    "ISO 27001",
    "NIST",
    "OWASP",
    "Penetration Testing",
    "Vulnerability Assessment",
    "Incident Response",
    "Forensics",
];

/// Why a raw field-set produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DropReason {
    #[error("missing source")]
    MissingSource,
    #[error("missing title")]
    MissingTitle,
    #[error("missing company")]
    MissingCompany,
    #[error("title matches no relevance keyword")]
    Irrelevant,
}

/// Fixed skill vocabulary scanned case-insensitively against title and description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillVocabulary {
    terms: Vec<String>,
    max_skills: usize,
}

impl Default for SkillVocabulary {
    fn default() -> Self {
        Self::new(DEFAULT_SKILL_TERMS.iter().map(|t| t.to_string()), DEFAULT_MAX_SKILLS)
    }
}

impl SkillVocabulary {
    pub fn new(terms: impl IntoIterator<Item = String>, max_skills: usize) -> Self {
        let mut out: Vec<String> = Vec::new();
        for term in terms {
            let term = collapse_whitespace(&term);
            if !term.is_empty() && !out.iter().any(|t| t.eq_ignore_ascii_case(&term)) {
                out.push(term);
            }
        }
        Self {
            terms: out,
            max_skills,
        }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn max_skills(&self) -> usize {
        self.max_skills
    }

    /// Vocabulary terms occurring in `text`, in vocabulary order, capped at `max_skills`.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let haystack = text.to_lowercase();
        self.terms
            .iter()
            .filter(|term| haystack.contains(&term.to_lowercase()))
            .take(self.max_skills)
            .cloned()
            .collect()
    }
}

/// Keeps records whose title contains at least one keyword. An empty keyword list keeps
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelevanceFilter {
    keywords: Vec<String>,
}

impl RelevanceFilter {
    pub fn new(keywords: impl IntoIterator<Item = String>) -> Self {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| collapse_whitespace(&k).to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.keywords.is_empty()
    }

    pub fn accepts(&self, title: &str) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let title = title.to_lowercase();
        self.keywords.iter().any(|k| title.contains(k.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    pub default_location: String,
    pub skills: SkillVocabulary,
    pub relevance: RelevanceFilter,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            default_location: DEFAULT_LOCATION.to_string(),
            skills: SkillVocabulary::default(),
            relevance: RelevanceFilter::default(),
        }
    }
}

/// Maps raw field-sets onto [`NormalizedRecord`]s.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

fn clean(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty()).map(str::to_string)
}

fn clean_collapsed(value: Option<&String>) -> Option<String> {
    value
        .map(|v| collapse_whitespace(v))
        .filter(|v| !v.is_empty())
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// `now` fills `posted_at` when the hint is missing or unreadable and anchors relative
    /// hints such as "3 days ago".
    pub fn normalize(
        &self,
        raw: &RawFieldSet,
        now: DateTime<Utc>,
    ) -> Result<NormalizedRecord, DropReason> {
        let source = IdentityKey::normalize_fragment(&raw.source);
        if source.is_empty() {
            return Err(DropReason::MissingSource);
        }
        let title = clean_collapsed(raw.title.as_ref()).ok_or(DropReason::MissingTitle)?;
        let company = clean_collapsed(raw.company.as_ref()).ok_or(DropReason::MissingCompany)?;
        if !self.config.relevance.accepts(&title) {
            return Err(DropReason::Irrelevant);
        }

        let description = clean(raw.description.as_ref());
        let skill_text = match &description {
            Some(d) => format!("{title} {d}"),
            None => title.clone(),
        };
        let skills = self.config.skills.extract(&skill_text);

        let (location, location_defaulted) = match clean_collapsed(raw.location.as_ref()) {
            Some(location) => (location, false),
            None => (self.config.default_location.clone(), true),
        };
        let (posted_at, posted_at_defaulted) = match raw
            .posted
            .as_deref()
            .and_then(|hint| parse_posted_hint(hint, now))
        {
            Some(at) => (at, false),
            None => (now, true),
        };

        Ok(NormalizedRecord {
            identity: IdentityKey::from_parts(&source, &title, &company),
            source,
            title,
            company,
            location,
            salary: clean(raw.salary.as_ref()),
            experience: clean(raw.experience.as_ref()),
            description,
            skills,
            url: clean(raw.url.as_ref()),
            posted_at,
            location_defaulted,
            posted_at_defaulted,
        })
    }
}

/// Reads absolute timestamps, `YYYY-MM-DD` dates, and the relative phrasing listing pages use
/// ("Just posted", "2 days ago", "30+ Days Ago").
pub fn parse_posted_hint(hint: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let trimmed = hint.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(at.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }

    let lowered = collapse_whitespace(trimmed).to_lowercase();
    let phrase = lowered
        .strip_prefix("posted ")
        .or_else(|| lowered.strip_prefix("active "))
        .unwrap_or(&lowered);
    if matches!(phrase, "today" | "just posted" | "just now") {
        return Some(now);
    }

    let mut parts = phrase.split(' ');
    let (count, unit, ago) = (parts.next()?, parts.next()?, parts.next()?);
    if ago != "ago" || parts.next().is_some() {
        return None;
    }
    let count: i64 = count.trim_end_matches('+').parse().ok()?;
    let delta = match unit.trim_end_matches('s') {
        "hour" | "hr" => TimeDelta::try_hours(count)?,
        "day" => TimeDelta::try_days(count)?,
        "week" => TimeDelta::try_weeks(count)?,
        "month" => TimeDelta::try_days(count.checked_mul(30)?)?,
        _ => return None,
    };
    now.checked_sub_signed(delta)
}
