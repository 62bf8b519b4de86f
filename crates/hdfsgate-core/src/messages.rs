//! Localized message lookup.
//!
//! Bundles are `key=template` tables per locale. Templates use positional
//! `{0}` placeholders and `''` for a literal quote; text between single quotes
//! is copied verbatim.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{HdfsError, Result};

/// Message key for a `mkdir` whose parent does not exist.
pub const PATH_INVALID: &str = "Hadoop.PathInv";
/// Message key for a missing file.
pub const FILE_NOT_EXISTS: &str = "FileNotEx";

const BUILTIN_EN: &str = "\
Hadoop.PathInv=Could not create directory. The path does not exist: ''{0}''
FileNotEx=The file ''{0}'' does not exist.
";

const BUILTIN_PT_BR: &str = "\
Hadoop.PathInv=N\u{e3}o foi poss\u{ed}vel criar diret\u{f3}rio. O caminho n\u{e3}o existe: ''{0}''
FileNotEx=O arquivo ''{0}'' n\u{e3}o existe.
";

/// Language plus optional country, e.g. `pt_BR`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locale {
    language: String,
    country: Option<String>,
}

impl Locale {
    /// Builds a locale, normalizing case.
    pub fn new(language: &str, country: Option<&str>) -> Self {
        Self {
            language: language.to_ascii_lowercase(),
            country: country
                .filter(|c| !c.is_empty())
                .map(str::to_ascii_uppercase),
        }
    }

    /// Parses `pt-BR`, `pt_BR` or `pt`; an empty tag yields English.
    pub fn parse(tag: &str) -> Self {
        let tag = tag.trim();
        if tag.is_empty() {
            return Self::default();
        }
        let mut parts = tag.split(['-', '_']);
        let language = parts.next().unwrap_or("en");
        Self::new(language, parts.next())
    }

    /// Lower-case language code.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Upper-case country code, when present.
    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    /// Bundle tags to consult, most specific first.
    pub fn candidates(&self) -> Vec<String> {
        let mut tags = Vec::with_capacity(2);
        if let Some(country) = &self.country {
            tags.push(format!("{}_{}", self.language, country));
        }
        tags.push(self.language.clone());
        tags
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self::new("en", None)
    }
}

impl FromStr for Locale {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.country {
            Some(country) => write!(f, "{}_{}", self.language, country),
            None => f.write_str(&self.language),
        }
    }
}

/// Resolves message keys to localized text.
pub trait MessageSource: Send + Sync {
    /// Renders `key` with `args` for `locale`.
    fn message(&self, key: &str, args: &[&str], locale: &Locale) -> String;
}

/// Message source backed by `.properties`-style bundles.
#[derive(Debug, Clone)]
pub struct BundleMessageSource {
    bundles: HashMap<String, HashMap<String, String>>,
    default_locale: Locale,
}

impl Default for BundleMessageSource {
    fn default() -> Self {
        Self::builtin()
    }
}

impl BundleMessageSource {
    /// Source with no bundles at all.
    pub fn empty(default_locale: Locale) -> Self {
        Self {
            bundles: HashMap::new(),
            default_locale,
        }
    }

    /// Source holding the built-in `en` and `pt_BR` bundles.
    pub fn builtin() -> Self {
        let mut source = Self::empty(Locale::default());
        source.add_bundle("en", parse_properties(BUILTIN_EN));
        source.add_bundle("pt_BR", parse_properties(BUILTIN_PT_BR));
        source
    }

    /// Sets the locale consulted after the requested one.
    pub fn with_default_locale(mut self, locale: Locale) -> Self {
        self.default_locale = locale;
        self
    }

    /// Fallback locale.
    pub fn default_locale(&self) -> &Locale {
        &self.default_locale
    }

    /// Merges `entries` into the bundle for `tag`, replacing existing keys.
    pub fn add_bundle(&mut self, tag: &str, entries: HashMap<String, String>) {
        self.bundles.entry(tag.to_string()).or_default().extend(entries);
    }

    /// Loads every `messages_<locale>.properties` (and `messages.properties`
    /// as the root bundle) found in `dir`. Returns the number of files read.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| {
            HdfsError::config(format!("cannot read message bundles in {}: {e}", dir.display()))
        })?;

        let mut loaded = 0;
        for entry in entries {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(stem) = name.strip_suffix(".properties") else {
                continue;
            };
            let tag = match stem.strip_prefix("messages") {
                Some("") => String::new(),
                Some(rest) => match rest.strip_prefix('_') {
                    Some(tag) => Locale::parse(tag).to_string(),
                    None => continue,
                },
                None => continue,
            };
            let text = std::fs::read_to_string(&path)?;
            let entries = parse_properties(&text);
            tracing::debug!(bundle = %path.display(), keys = entries.len(), "message bundle loaded");
            self.add_bundle(&tag, entries);
            loaded += 1;
        }
        Ok(loaded)
    }

    fn lookup(&self, key: &str, locale: &Locale) -> Option<&str> {
        let chain = locale
            .candidates()
            .into_iter()
            .chain(self.default_locale.candidates())
            .chain(std::iter::once(String::new()));
        for tag in chain {
            if let Some(template) = self.bundles.get(&tag).and_then(|b| b.get(key)) {
                return Some(template);
            }
        }
        None
    }
}

impl MessageSource for BundleMessageSource {
    fn message(&self, key: &str, args: &[&str], locale: &Locale) -> String {
        match self.lookup(key, locale) {
            Some(template) => format_message(template, args),
            None if args.is_empty() => key.to_string(),
            None => format!("{key} {}", args.join(", ")),
        }
    }
}

/// Applies positional arguments to a template.
pub fn format_message(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len() + 16);
    let mut chars = template.chars().peekable();
    let mut quoted = false;

    while let Some(c) = chars.next() {
        match c {
            '\'' if chars.peek() == Some(&'\'') => {
                chars.next();
                out.push('\'');
            }
            '\'' => quoted = !quoted,
            '{' if !quoted => {
                let mut spec = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    spec.push(c);
                }
                let index = spec.split(',').next().unwrap_or_default().trim();
                match index.parse::<usize>().ok().and_then(|i| args.get(i)) {
                    Some(arg) if closed => out.push_str(arg),
                    _ => {
                        out.push('{');
                        out.push_str(&spec);
                        if closed {
                            out.push('}');
                        }
                    }
                }
            }
            c => out.push(c),
        }
    }
    out
}

/// Parses `.properties` text: `key=value` or `key: value`, `#`/`!` comments,
/// trailing-backslash continuations and `\uXXXX` escapes.
pub fn parse_properties(text: &str) -> HashMap<String, String> {
    let mut entries = HashMap::new();
    let mut logical = String::new();

    for line in text.lines() {
        let line = if logical.is_empty() {
            line.trim_start()
        } else {
            line.trim()
        };
        if logical.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
            continue;
        }
        let trailing = line.chars().rev().take_while(|c| *c == '\\').count();
        if trailing % 2 == 1 {
            logical.push_str(&line[..line.len() - 1]);
            continue;
        }
        logical.push_str(line);

        let split = logical.find(['=', ':']);
        let (key, value) = match split {
            Some(idx) => (&logical[..idx], &logical[idx + 1..]),
            None => (logical.as_str(), ""),
        };
        entries.insert(unescape(key.trim()), unescape(value.trim_start()));
        logical.clear();
    }
    entries
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
