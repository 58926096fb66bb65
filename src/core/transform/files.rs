//! File transfer (FFT) derivation
//!
//! The mirror ingests attachments through FFT fields. They come from three
//! places: files stored under the record's document symbols, 561$u URIs, and
//! 856 links on whitelisted hosts.

use crate::adapters::database::FileStore;
use crate::domain::{Field, Language, MarcFields, Record, Result, Subfield};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::HashSet;
use url::{Position, Url};

/// Placeholder symbol values that never have files
const IGNORED_SYMBOLS: [&str; 3] = ["", " ", "***"];

/// Characters left as-is when quoting file paths
const PATH_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

/// Cleans a file name for the mirror
///
/// Dotted base parts are joined with `-` and ` [];` become `_^^!`.
///
/// # Examples
///
/// ```
/// use dlsync::core::transform::clean_fn;
///
/// assert_eq!(clean_fn("A.RES.1 [1].pdf"), "A-RES-1_^1^.pdf");
/// ```
pub fn clean_fn(name: &str) -> String {
    let joined = match name.rsplit_once('.') {
        Some((base, ext)) => format!("{}.{}", base.replace('.', "-"), ext),
        None => format!(".{name}"),
    };

    joined
        .chars()
        .map(|c| match c {
            ' ' => '_',
            '[' | ']' => '^',
            ';' => '!',
            other => other,
        })
        .collect()
}

/// Encodes document symbols into a file name, e.g. `A_RES_1-EN.pdf`
pub fn encode_fn(symbols: &[&str], language: Language, extension: &str) -> String {
    let encoded: Vec<String> = symbols
        .iter()
        .map(|symbol| {
            symbol
                .chars()
                .map(|c| match c {
                    ' ' | '/' => '_',
                    '[' | ']' => '^',
                    '*' => '!',
                    ':' => '#',
                    ';' => '%',
                    other => other,
                })
                .collect()
        })
        .collect();

    format!("{}-{}.{}", encoded.join("--"), language.code(), extension)
}

/// Percent-encodes everything except `A-Za-z0-9_.-~/`
pub fn quote(value: &str) -> String {
    utf8_percent_encode(value, PATH_SAFE).to_string()
}

/// Whether the value already holds at least one `%XX` escape
pub fn has_percent_escape(value: &str) -> bool {
    value
        .as_bytes()
        .windows(3)
        .any(|w| w[0] == b'%' && w[1].is_ascii_hexdigit() && w[2].is_ascii_hexdigit())
}

/// File name as it appears at the end of a mirror 856$u
pub fn mirror_file_name(name: &str) -> String {
    let escaped = clean_fn(name).replace('%', "%25");
    if has_percent_escape(&escaped) {
        escaped
    } else {
        quote(&escaped)
    }
}

/// Whether a mirror file URL ends with the file `name`
///
/// Mirror file names may carry extra characters after the base name.
pub fn mirror_has_file(mirror_urls: &[&str], name: &str) -> bool {
    let expected = mirror_file_name(name);
    let base = expected
        .rsplit_once('.')
        .map_or(expected.as_str(), |(base, _)| base);

    mirror_urls
        .iter()
        .any(|url| last_segment(url).starts_with(base))
}

/// Host of an absolute URL
pub fn url_host(value: &str) -> Option<String> {
    Url::parse(value).ok()?.host_str().map(str::to_string)
}

/// Link rewritten for file transfer: the path is quoted unless the link
/// already carries escapes
fn transfer_url(link: &str, parsed: &Url) -> String {
    let path = if has_percent_escape(link) {
        parsed.path().to_string()
    } else {
        quote(&percent_decode_str(parsed.path()).decode_utf8_lossy())
    };
    format!("{}{path}", &parsed[..Position::BeforePath])
}

/// Last path segment of a URL or URI
pub fn last_segment(value: &str) -> &str {
    value.rsplit('/').next().unwrap_or(value)
}

/// Base name and extension of a cleaned file name
fn base_and_ext(name: &str) -> (&str, &str) {
    name.rsplit_once('.').unwrap_or(("", name))
}

/// Tracks base names already used by FFT fields of one record
#[derive(Debug, Default)]
struct NameAllocator {
    seen: Vec<String>,
}

impl NameAllocator {
    /// Suffixes `_<place>` when the base name was already taken
    fn allocate(&mut self, cleaned: String, place: usize) -> String {
        let (base, ext) = base_and_ext(&cleaned);
        if self.seen.iter().any(|s| s == base) {
            format!("{base}_{place}.{ext}")
        } else {
            self.seen.push(base.to_string());
            cleaned
        }
    }
}

fn fft(subfields: Vec<Subfield>) -> Field {
    Field::data("FFT", ' ', ' ', subfields)
}

/// Document symbols of a bib (191$a then 191$z), de-duplicated in order
pub fn document_symbols(record: &Record) -> Vec<&str> {
    let mut symbols: Vec<&str> = Vec::new();
    for symbol in record
        .get_values("191", 'a')
        .into_iter()
        .chain(record.get_values("191", 'z'))
    {
        if !IGNORED_SYMBOLS.contains(&symbol) && !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }
    symbols
}

/// Adds one FFT per language found among the files stored under the record's symbols
pub async fn symbol_files(record: &mut Record, files: &dyn FileStore) -> Result<()> {
    let symbols: Vec<String> = document_symbols(record)
        .into_iter()
        .map(str::to_string)
        .collect();
    let name_symbols: Vec<&str> = if symbols.len() <= 3 {
        symbols.iter().map(String::as_str).collect()
    } else {
        symbols.iter().take(1).map(String::as_str).collect()
    };

    let mut seen = HashSet::new();
    let mut added = Vec::new();

    for symbol in &symbols {
        for language in Language::ALL {
            if seen.contains(&language) {
                continue;
            }
            if let Some(file) = files.latest_by_symbol_language(symbol, language).await? {
                added.push(fft(vec![
                    Subfield::new('a', format!("https://{}", file.uri)),
                    Subfield::new('d', language.display_name()),
                    Subfield::new('n', encode_fn(&name_symbols, language, "pdf")),
                ]));
                seen.insert(language);
            }
        }
    }

    record.fields.extend(added);
    Ok(())
}

/// Adds one FFT for each 561$u URI with a stored file
pub async fn uri_files(record: &mut Record, files: &dyn FileStore) -> Result<()> {
    let uris: Vec<String> = record
        .get_values("561", 'u')
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut names = NameAllocator::default();
    let mut place = 0;

    for uri in uris {
        let Some(file) = files.find_by_uri(&uri).await? else {
            continue;
        };

        let original = if file.filename.is_empty() {
            last_segment(&uri).to_string()
        } else {
            file.filename.clone()
        };
        let name = names.allocate(clean_fn(&original), place);

        record.push(fft(vec![
            Subfield::new('a', format!("https://{}", file.uri)),
            Subfield::new('d', file.language_names()),
            Subfield::new('n', name),
        ]));
        place += 1;
    }

    Ok(())
}

/// Converts 856 links on whitelisted hosts into FFT fields and removes the links
pub fn link_files(record: &mut Record, whitelist: &[String]) {
    let mut place = record.get_fields("FFT").count();
    let mut names = NameAllocator::default();
    let mut converted = Vec::new();

    record.fields.retain(|field| {
        if field.tag != "856" {
            return true;
        }
        let Some(url) = field.get_value('u') else {
            return true;
        };
        let Some(parsed) = Url::parse(url).ok().filter(|u| {
            u.host_str()
                .is_some_and(|host| whitelist.iter().any(|h| h == host))
        }) else {
            return true;
        };

        let mut subfields = vec![
            Subfield::new('a', transfer_url(url, &parsed)),
            Subfield::new('n', names.allocate(clean_fn(last_segment(url.trim_end())), place)),
        ];
        if parsed.path().rsplit('.').next() == Some("tiff") {
            subfields.push(Subfield::new('r', "tiff"));
        }
        if let Some(label) = field.get_value('3').filter(|l| !l.is_empty()) {
            let label = if label == "Eng" { "English" } else { label };
            subfields.push(Subfield::new('d', label));
        }

        converted.push(fft(subfields));
        place += 1;
        false
    });

    record.fields.extend(converted);
}
