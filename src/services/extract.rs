//! Field extraction from OCR text of Russian supplier invoices.
//!
//! Each field has its own ordered pattern table; the first pattern that
//! matches (and survives the exclusion checks) wins. A non-match yields
//! `None`, never an error, so callers treat every field as optional.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::models::ParsedInvoice;

/// Monetary token: digits, optional thousands groups split by space,
/// comma or dot, optional kopek part.
const AMOUNT: &str = r"(\d+(?:[\s,\.]\d{3})*(?:[\.,]\d{1,2})?)";

fn compile(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("invalid extraction pattern"))
        .collect()
}

fn compile_static(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("invalid extraction pattern"))
        .collect()
}

// ---- invoice number ----

static NUMBER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_static(&[
        // Alphanumeric numbers without a dash (СЭ00846838, ТВЭ01037849).
        r"(?i)(?:Счёт|Счет)\s*([А-ЯЁA-Z]{1,4}\d{6,12})",
        r"(?i)Заказ.*?№\s*([А-ЯЁA-Z]{1,4}\d{6,12})",
        r"№\s*([А-ЯЁA-Z]{1,4}\d{6,12})\s*от",
        // Specification sheets.
        r"(?i)СПЕЦИФИКАЦИЯ\s*№\s*(\d+)",
        // Alphanumeric with a dash (УТ-784).
        r"№\s*([А-ЯЁA-Z]+-\d+)",
        r"(?i)счёт.*?№\s*([А-ЯA-Z]+-\d+)",
        r"(?i)счет.*?№\s*([А-ЯA-Z]+-\d+)",
        r"(?i)с[чт].*?№\s*([А-ЯA-Z]+-\d+)",
        // OCR artifact "Счет и Бух-784".
        r"(?i)Счет\s+и\s+Бух[-\s]*(\d+)",
        // Short numbers followed by "от" on the same line.
        r"(?i)счёт\s*№\s*(\d{1,6})\s*от",
        r"(?i)счет\s*№\s*(\d{1,6})\s*от",
        r"(?i)с[чт]\s*№\s*(\d{1,6})\s*от",
        // Short numbers without "от"; the trailing non-digit keeps long
        // bank details (БИК, account numbers) from matching partially.
        r"(?i)счёт\s*№\s*(\d{1,6})(?:\D|$)",
        r"(?i)счет\s*№\s*(\d{1,6})(?:\D|$)",
        r"(?i)с[чт]\s*№\s*(\d{1,6})(?:\D|$)",
        // Contract-style invoices.
        r"(?i)счёт[-\s]*договор.*?№\s*(\d+)",
        r"(?i)счет[-\s]*договор.*?№\s*(\d+)",
        // Zero-padded ledger numbers (00000007898).
        r"№\s*(0{4}\d+)\s*от",
        r"(?i)счёт.*?№\s*(0{4}\d+)",
        r"(?i)счет.*?№\s*(0{4}\d+)",
        // Plain fallbacks; these can catch bank details, which the
        // exclusion checks below filter out.
        r"(?i)счёт.*?№\s*(\d+)",
        r"(?i)счет.*?№\s*(\d+)",
        r"(?i)с[чт].*?№\s*(\d+)",
        r"№\s*(\d+)\s*от\s*\d",
        r"(?i)Invoice.*?№\s*(\d+)",
        r"(?i)с[чт]\s+(\d+)\s+от",
        r"(?i)с[чт].*?(\d{5,})",
        r"№\s*(\d{2,10})\s*от",
    ])
});

static INN_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)ИНН\s*:?\s*$").unwrap());
static BANK_CONTEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)БИК|Банк|К/С|Кор").unwrap());

/// Bank account numbers, INN and БИК codes look like invoice numbers to
/// the loose fallback patterns; reject a candidate when its shape and
/// surrounding text say it is one of those.
fn is_bank_detail(text: &str, number: &str) -> bool {
    if !number.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    // Settlement accounts are exactly 20 digits.
    if number.len() == 20 {
        return true;
    }
    // INN is 10 or 12 digits and labelled as such.
    if (number.len() == 10 || number.len() == 12) && labelled_as_inn(text, number) {
        return true;
    }
    // БИК is 9 digits starting with 04, near banking vocabulary.
    if number.len() == 9 && number.starts_with("04") {
        if let Some(pos) = text.find(number) {
            let start = pos.saturating_sub(100);
            let window = slice_at_char_boundaries(text, start, pos + number.len() + 100);
            if BANK_CONTEXT.is_match(window) {
                return true;
            }
        }
    }
    false
}

fn labelled_as_inn(text: &str, number: &str) -> bool {
    let mut from = 0;
    while let Some(rel) = text[from..].find(number) {
        let pos = from + rel;
        let before = slice_at_char_boundaries(text, pos.saturating_sub(12), pos);
        if INN_LABEL.is_match(before) {
            return true;
        }
        from = pos + number.len();
    }
    false
}

fn slice_at_char_boundaries(text: &str, mut start: usize, mut end: usize) -> &str {
    end = end.min(text.len());
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    while end < text.len() && !text.is_char_boundary(end) {
        end += 1;
    }
    &text[start..end]
}

pub fn extract_invoice_number(text: &str) -> Option<String> {
    for pattern in NUMBER_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(text) {
            let number = captures.get(1)?.as_str().trim();
            if is_bank_detail(text, number) {
                continue;
            }
            return Some(number.to_string());
        }
    }
    None
}

// ---- dates ----

static DATE_RUSSIAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(\d{1,2})\s+(января|февраля|марта|апреля|мая|июня|июля|августа|сентября|октября|ноября|декабря)\s+(\d{4})",
    )
    .unwrap()
});
static DATE_DMY_DOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})\.(\d{1,2})\.(\d{4})").unwrap());
static DATE_DMY_SLASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{4})").unwrap());
static DATE_ISO: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{4})-(\d{1,2})-(\d{1,2})").unwrap());

fn russian_month(name: &str) -> Option<u32> {
    let month = match name.to_lowercase().as_str() {
        "января" => 1,
        "февраля" => 2,
        "марта" => 3,
        "апреля" => 4,
        "мая" => 5,
        "июня" => 6,
        "июля" => 7,
        "августа" => 8,
        "сентября" => 9,
        "октября" => 10,
        "ноября" => 11,
        "декабря" => 12,
        _ => return None,
    };
    Some(month)
}

fn to_iso(year: &str, month: u32, day: &str) -> Option<String> {
    let year: i32 = year.parse().ok()?;
    let day: u32 = day.parse().ok()?;
    // Rejects impossible dates like 45.13.2024.
    chrono::NaiveDate::from_ymd_opt(year, month, day)
        .map(|d| d.format("%Y-%m-%d").to_string())
}

pub fn extract_date(text: &str) -> Option<String> {
    if let Some(c) = DATE_RUSSIAN.captures(text) {
        if let Some(month) = russian_month(&c[2]) {
            if let Some(date) = to_iso(&c[3], month, &c[1]) {
                return Some(date);
            }
        }
    }
    for pattern in [&*DATE_DMY_DOT, &*DATE_DMY_SLASH] {
        if let Some(c) = pattern.captures(text) {
            if let Ok(month) = c[2].parse::<u32>() {
                if let Some(date) = to_iso(&c[3], month, &c[1]) {
                    return Some(date);
                }
            }
        }
    }
    if let Some(c) = DATE_ISO.captures(text) {
        if let Ok(month) = c[2].parse::<u32>() {
            if let Some(date) = to_iso(&c[1], month, &c[3]) {
                return Some(date);
            }
        }
    }
    None
}

static DUE_DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_static(&[
        r"(?i)(?:оплатить|оплата).*?не\s+позднее\s+(\d{1,2})\.(\d{1,2})\.(\d{4})",
        r"(?i)не\s+позднее\s+(\d{1,2})\.(\d{1,2})\.(\d{4})",
    ])
});

pub fn extract_due_date(text: &str) -> Option<String> {
    for pattern in DUE_DATE_PATTERNS.iter() {
        if let Some(c) = pattern.captures(text) {
            if let Ok(month) = c[2].parse::<u32>() {
                if let Some(date) = to_iso(&c[3], month, &c[1]) {
                    return Some(date);
                }
            }
        }
    }
    None
}

// ---- supplier name ----

// Quote classes cover straight, typographic and angle quotes.
const Q_OPEN: &str = "[\"“”«]";
const Q_CLOSE: &str = "[\"“”»]";

static SUPPLIER_DIRECT: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        format!(
            r#"(?i)Поставщик:\s*((?:Акционерное\s+Общество|АО|ОАО|ЗАО|ПАО)\s*{Q_OPEN}[^"“”»\n]{{3,60}}{Q_CLOSE})"#
        ),
        format!(r#"(?i)Поставщик:\s*(ООО\s*{Q_OPEN}[^"“”»\n]{{3,60}}{Q_CLOSE})"#),
        format!(r#"(?i)Поставщик:\s*((?:АО|ОАО|ЗАО|ПАО|ООО)\s*{Q_OPEN}?[^,\n]{{3,60}}?)(?:,\s*ИНН|\s+ИНН)"#),
        format!(r#"(?i)Поставщик:\s*(Акционерное\s+Общество\s*{Q_OPEN}?[^,\n]{{3,60}}?)(?:,|\s+ИНН)"#),
    ])
});

static SUPPLIER_CONTEXT: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        format!(
            r#"(?i)(?:Получатель|Продавец|Поставщик)[\s:]*\n?\s*((?:ООО|ИП|АО|ЗАО|ПАО)\s*{Q_OPEN}?[^"“”»\n]{{3,50}}{Q_CLOSE}?)"#
        ),
        format!(
            r#"(?is)(?:Получатель|Продавец|Поставщик)[^\n]{{0,200}}?((?:ООО|ИП|АО)\s*{Q_OPEN}[^"“”»\n]{{3,50}}{Q_CLOSE})"#
        ),
    ])
});

static SUPPLIER_GLOBAL: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        // Greedy to the last quote, so nested quotes survive.
        r#"ООО\s*"(.*)""#.to_string(),
        format!(r#"ООО\s*{Q_OPEN}([^"“”»\n,]{{3,40}}){Q_CLOSE}"#),
        // "000" is how OCR often reads "ООО".
        format!(r#"000\s*{Q_OPEN}([^"“”»\n,]{{3,40}}){Q_CLOSE}"#),
        r#"(?:ИП|Индивидуальный предприниматель)\s+([А-ЯЁ][а-яё]+\s+[А-ЯЁ][а-яё]+\s+[А-ЯЁ][а-яё]+)"#
            .to_string(),
    ])
});

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static TRAILING_DETAILS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[,\s]*(?:ИНН|БИК|КПП|тел\.|Банк|Сч\.?\s*№?\s*\d+).*$").unwrap()
});

static REJECT_FRAGMENTS: &[&str] = &["самовывоз", "доверенности", "паспорта", "при наличии"];

fn clean_company(raw: &str) -> String {
    let collapsed = WHITESPACE_RUN.replace_all(raw.trim(), " ");
    let stripped = TRAILING_DETAILS.replace(&collapsed, "");
    stripped
        .trim_matches(|c| c == '"' || c == '«' || c == '»' || c == '“' || c == '”' || c == ' ')
        .to_string()
}

fn acceptable_company(name: &str) -> bool {
    let lower = name.to_lowercase();
    name.chars().count() >= 3
        && !name.chars().all(|c| c.is_ascii_digit())
        && !REJECT_FRAGMENTS.iter().any(|f| lower.contains(f))
}

pub fn extract_supplier_name(text: &str) -> Option<String> {
    const FULL_AO: &str = "акционерное общество";

    for pattern in SUPPLIER_DIRECT.iter() {
        if let Some(m) = pattern.captures(text).and_then(|c| c.get(1)) {
            let mut name = clean_company(m.as_str());
            // Cyrillic case folding keeps byte offsets stable here.
            if name.to_lowercase().starts_with(FULL_AO) {
                name = format!("АО {}", name[FULL_AO.len()..].trim());
            }
            if name.chars().count() >= 5 {
                return Some(requote(name));
            }
        }
    }

    for pattern in SUPPLIER_CONTEXT.iter() {
        if let Some(m) = pattern.captures(text).and_then(|c| c.get(1)) {
            let name = clean_company(m.as_str());
            if name.chars().count() >= 5 && acceptable_company(&name) {
                return Some(requote(name));
            }
        }
    }

    for (index, pattern) in SUPPLIER_GLOBAL.iter().enumerate() {
        if let Some(m) = pattern.captures(text).and_then(|c| c.get(1)) {
            let inner = clean_company(m.as_str());
            if !acceptable_company(&inner) {
                continue;
            }
            // The ИП pattern captures a bare full name.
            if index == 3 {
                return Some(format!("ИП {}", inner));
            }
            return Some(format!("ООО \"{}\"", inner));
        }
    }

    None
}

/// Normalizes quoting of the name part: `ООО СМ Групп` and the
/// half-stripped `ООО "СМ Групп` both become `ООО "СМ Групп"`.
fn requote(name: String) -> String {
    for prefix in ["ООО ", "АО ", "ЗАО ", "ОАО ", "ПАО "] {
        if let Some(rest) = name.strip_prefix(prefix) {
            let rest = rest
                .trim()
                .trim_matches(|c| matches!(c, '"' | '«' | '»' | '“' | '”'));
            return format!("{}\"{}\"", prefix, rest);
        }
    }
    name
}

// ---- INN ----

static INN_SUPPLIER_TIERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_static(&[
        r"(?i)Поставщик:[^\n]*?ИНН[:\s]*(\d{10,12})",
        r"(?i)Поставщик:[^\n]*?(\d{10})\s*/\s*\d{9}",
        r"(?i)Получатель[:\s]*\n?\s*(\d{10,12})",
        r"(?i)Получатель[^\n]{0,100}?ИНН[:\s]*(\d{10,12})",
        r"(?i)Продавец:[^\n]{0,100}?ИНН[:\s]*(\d{10,12})",
        r"(?is)(?:Продавец|Поставщик)[^\n]{0,200}?ИНН[:\s]*(\d{10,12})",
    ])
});

static INN_GENERIC: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_static(&[
        r"(?i)ИНН[:\s]*(\d{10,12})",
        r"(\d{10})\s*/\s*\d{9}",
        r"(?i)(\d{12})\s*(?:ИП|Индивидуальный предприниматель)",
    ])
});

pub fn extract_inn(text: &str) -> Option<String> {
    for pattern in INN_SUPPLIER_TIERS.iter().chain(INN_GENERIC.iter()) {
        if let Some(c) = pattern.captures(text) {
            let inn = c.get(1)?.as_str();
            if inn.len() == 10 || inn.len() == 12 {
                return Some(inn.to_string());
            }
        }
    }
    None
}

// ---- total amount ----

static EXCLUDED_NUMBER_SOURCES: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_static(&[
        r"(?i)ИНН[\s:]*(\d{10,12})",
        r"(?i)БИК[\s:]*(\d{9})",
        r"(?i)Сч\.?\s*№?\s*(\d{20})",
        r"(?i)счет[\s№]*(\d{20})",
        r"(?i)р/с[\s:]*(\d{20})",
    ])
});

static TOTAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        format!(r"(?i)Всего\s+наименований\s+\d+,?\s*на\s+сумму[\s:]*{AMOUNT}\s*(?:RUB|руб)"),
        format!(r"(?i)(?:всего\s*к\s*оплате|к\s*оплате)[\s:|]*{AMOUNT}"),
        format!(r"(?i)итого\s*с\s*ндс[\s:|]*{AMOUNT}"),
        format!(r"(?i)(?:итого|Total)[\s:|]*\|?\s*{AMOUNT}"),
        format!(r"(?i)всего[\s\w]*?{AMOUNT}\s*руб"),
        format!(r"(?i)на\s+сумму[\s:]*{AMOUNT}\s*руб"),
        format!(r"(?i)к\s*доплате[\s:|]*{AMOUNT}"),
        format!(r"(?i)общая\s*стоимость[\s:|]*{AMOUNT}"),
        format!(r"(?i)сумма\s*к\s*доплате\s*с\s*ндс[\s:|]*{AMOUNT}"),
    ])
});

// Lowest priority: a bare amount next to a currency marker. Used when
// none of the labelled totals are present.
static CURRENCY_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i){AMOUNT}\s*(?:руб|₽|RUB|USD|\$|EUR|€)")).unwrap()
});

// Typewriter-era kopeck notation: "Итого: 168897-22".
static TOTAL_DASH_KOPECK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:итого|всего\s*к\s*оплате|к\s*оплате)[\s:|]*(\d[\d\s]*\d|\d)-(\d{2})(?:\D|$)")
        .unwrap()
});

fn excluded_numbers(text: &str) -> HashSet<String> {
    let mut excluded = HashSet::new();
    for pattern in EXCLUDED_NUMBER_SOURCES.iter() {
        for c in pattern.captures_iter(text) {
            if let Some(m) = c.get(1) {
                excluded.insert(m.as_str().to_string());
            }
        }
    }
    excluded
}

/// Normalizes a captured money token to f64. Handles Russian spelling
/// (space thousands separators, decimal comma) and plain decimals.
fn parse_amount(raw: &str) -> Option<f64> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let normalized = match (compact.rfind(','), compact.rfind('.')) {
        (Some(comma), Some(dot)) => {
            // The later separator is the decimal one.
            if comma > dot {
                compact.replace('.', "").replacen(',', ".", 1)
            } else {
                compact.replace(',', "")
            }
        }
        (Some(_), None) => compact.replace(',', "."),
        _ => compact,
    };
    normalized.parse::<f64>().ok()
}

fn plausible_total(amount: f64, excluded: &HashSet<String>) -> bool {
    let as_integer = format!("{}", amount as i64);
    if excluded.contains(&as_integer) {
        return false;
    }
    // Whole 10-12 digit numbers are INN-shaped, not invoice totals.
    if (10..=12).contains(&as_integer.len()) && amount == amount.trunc() {
        return false;
    }
    if amount > 1_000_000_000.0 {
        return false;
    }
    true
}

pub fn extract_total_amount(text: &str) -> Option<f64> {
    let excluded = excluded_numbers(text);

    if let Some(c) = TOTAL_DASH_KOPECK.captures(text) {
        let rubles: String = c[1].chars().filter(|ch| !ch.is_whitespace()).collect();
        if let Ok(amount) = format!("{}.{}", rubles, &c[2]).parse::<f64>() {
            if amount > 100.0 && plausible_total(amount, &excluded) {
                return Some(amount);
            }
        }
    }

    for pattern in TOTAL_PATTERNS.iter() {
        for c in pattern.captures_iter(text) {
            let raw = match c.get(1) {
                Some(m) => m.as_str(),
                None => continue,
            };
            if let Some(amount) = parse_amount(raw) {
                // Table columns often carry small per-line numbers; a
                // labelled total below the threshold is noise.
                if amount > 100.0 && plausible_total(amount, &excluded) {
                    return Some(amount);
                }
            }
        }
    }

    if let Some(c) = CURRENCY_AMOUNT.captures(text) {
        if let Some(amount) = parse_amount(c.get(1)?.as_str()) {
            if amount > 0.0 && plausible_total(amount, &excluded) {
                return Some(amount);
            }
        }
    }

    None
}

// ---- VAT ----

static VAT_AMOUNT_WORDED: Lazy<Regex> = Lazy::new(|| {
    // "НДС 20% - 9 161 руб. 86 коп."
    Regex::new(r"(?i)НДС\s*(\d+)%\s*[-–—:]\s*([0-9]{1,3}(?:\s[0-9]{3})*)\s*руб\.?\s*(\d{2})\s*коп")
        .unwrap()
});

static VAT_RATE_AND_AMOUNT: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        format!(r"(?i)в\s*том\s*числе\s*НДС\s*\(?\s*(\d+)%\)?[\s:|]*{AMOUNT}"),
        format!(r"(?i)НДС\s*(\d+)%\s*[-–—:]\s*{AMOUNT}"),
        format!(r"(?i)НДС\s*\((\d+)%\)[\s:|]*{AMOUNT}"),
        format!(r"(?i)НДС\s*(\d+)%[\s]+{AMOUNT}"),
    ])
});

static VAT_AMOUNT_ONLY: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        format!(r"(?i)в\s*том\s*числе\s*НДС[\s:|]*{AMOUNT}"),
        format!(r"(?i)НДС[\s:|]+{AMOUNT}"),
        format!(r"(?i)Итого.*?НДС.*?{AMOUNT}"),
    ])
});

static VAT_MENTION: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_static(&[
        r"(?i)Н?ДС\s*(\d+)%",
        r"(?i)в\s*том\s*числе\s*Н?ДС",
        r"(?i)том\s*числе\s*С",
        r"(?i)НДС[:\s]+[0-9]",
        // OCR sometimes keeps only "С" of "НДС"; anchor it to a
        // non-letter boundary to avoid random hits.
        r"(?:^|[^\p{L}\d])С[:\s]+[0-9]",
    ])
});

/// Returns `(vat_amount, vat_rate)`. A VAT mention without an explicit
/// rate falls back to the standard Russian 20%.
pub fn extract_vat(text: &str) -> (Option<f64>, Option<f64>) {
    if let Some(c) = VAT_AMOUNT_WORDED.captures(text) {
        let rate = c[1].parse::<f64>().ok();
        let rubles: String = c[2].chars().filter(|ch| !ch.is_whitespace()).collect();
        if let Ok(amount) = format!("{}.{}", rubles, &c[3]).parse::<f64>() {
            return (Some(amount), rate);
        }
    }

    for pattern in VAT_RATE_AND_AMOUNT.iter() {
        if let Some(c) = pattern.captures(text) {
            let rate = c[1].parse::<f64>().ok();
            if let Some(amount) = parse_amount(&c[2]) {
                return (Some(amount), rate);
            }
        }
    }

    for pattern in VAT_AMOUNT_ONLY.iter() {
        if let Some(c) = pattern.captures(text) {
            if let Some(amount) = parse_amount(&c[1]) {
                return (Some(amount), None);
            }
        }
    }

    for pattern in VAT_MENTION.iter() {
        if let Some(c) = pattern.captures(text) {
            let rate = c
                .get(1)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .unwrap_or(20.0);
            return (None, Some(rate));
        }
    }

    (None, None)
}

/// Infers the VAT rate from the amounts when the text itself did not
/// state one. Only the two legal rates are accepted.
pub fn infer_vat_rate(vat_amount: f64, total_amount: f64) -> Option<f64> {
    if vat_amount <= 0.0 || total_amount <= vat_amount {
        return None;
    }
    let rate = vat_amount / (total_amount - vat_amount) * 100.0;
    if (rate - 20.0).abs() < 1.0 {
        Some(20.0)
    } else if (rate - 10.0).abs() < 1.0 {
        Some(10.0)
    } else {
        None
    }
}

// ---- document gate ----

static INVOICE_KEYWORDS: &[&str] = &[
    "счёт",
    "счет",
    "счёт-фактура",
    "счет-фактура",
    "invoice",
    "итого",
    "всего к оплате",
    "к доплате",
    "общая стоимость",
];

static EXCLUSION_KEYWORDS: &[&str] = &[
    "информационная карта",
    "участника торгов",
    "участника подрядных торгов",
    "анкета",
    "заявка",
    "справка о деятельности",
    "реквизиты организации",
];

/// Keyword gate that keeps tender questionnaires and company-details
/// sheets out of the invoice pipeline.
pub fn is_invoice_document(text: &str) -> bool {
    let lower = text.to_lowercase();
    if EXCLUSION_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return false;
    }
    INVOICE_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Runs every field extractor over the text. Missing fields stay `None`;
/// the function itself cannot fail.
pub fn extract(text: &str) -> ParsedInvoice {
    let total_amount = extract_total_amount(text);
    let (vat_amount, mut vat_rate) = extract_vat(text);
    if vat_rate.is_none() {
        if let (Some(vat), Some(total)) = (vat_amount, total_amount) {
            vat_rate = infer_vat_rate(vat, total);
        }
    }

    ParsedInvoice {
        invoice_number: extract_invoice_number(text),
        invoice_date: extract_date(text),
        due_date: extract_due_date(text),
        total_amount,
        vat_amount,
        vat_rate,
        supplier_name: extract_supplier_name(text),
        supplier_inn: extract_inn(text),
    }
}

/// Percentage of fields where the extractor agrees with a corrected
/// reference, counted over the fields the reference actually fills in.
pub fn quality_score(parsed: &ParsedInvoice, reference: &ParsedInvoice) -> Option<f64> {
    fn amounts_match(a: Option<f64>, b: Option<f64>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => (a - b).abs() < 0.01,
            _ => false,
        }
    }

    let mut checked = 0u32;
    let mut matched = 0u32;

    macro_rules! check_text {
        ($field:ident) => {
            if reference.$field.is_some() {
                checked += 1;
                if parsed.$field == reference.$field {
                    matched += 1;
                }
            }
        };
    }
    macro_rules! check_amount {
        ($field:ident) => {
            if reference.$field.is_some() {
                checked += 1;
                if amounts_match(parsed.$field, reference.$field) {
                    matched += 1;
                }
            }
        };
    }

    check_text!(invoice_number);
    check_text!(invoice_date);
    check_text!(due_date);
    check_amount!(total_amount);
    check_amount!(vat_amount);
    check_amount!(vat_rate);
    check_text!(supplier_name);
    check_text!(supplier_inn);

    if checked == 0 {
        None
    } else {
        Some(f64::from(matched) / f64::from(checked) * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_amount_russian_spelling() {
        assert_eq!(extract_total_amount("Итого: 54 971,20 руб."), Some(54971.20));
    }

    #[test]
    fn total_amount_is_idempotent_on_its_own_output() {
        let first = extract_total_amount("Итого: 54 971,20 руб.").unwrap();
        let second = extract_total_amount(&format!("{} руб", first)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn total_amount_priority_order() {
        let text = "Итого: 100 500,00\nВсего к оплате: 120 600,00";
        assert_eq!(extract_total_amount(text), Some(120600.0));
    }

    #[test]
    fn total_amount_skips_inn_and_account_numbers() {
        let text = "ИНН 7812345678\nр/с 40702810900000012345\nИтого: 15 000,00 руб";
        assert_eq!(extract_total_amount(text), Some(15000.0));
    }

    #[test]
    fn total_amount_accepts_excel_style_decimal() {
        assert_eq!(extract_total_amount("Всего к оплате: 19034.7"), Some(19034.7));
    }

    #[test]
    fn total_amount_reads_dash_kopeck_notation() {
        assert_eq!(extract_total_amount("Итого: 168897-22"), Some(168897.22));
        assert_eq!(
            extract_total_amount("Всего к оплате: 54 971-20 руб"),
            Some(54971.20)
        );
    }

    #[test]
    fn amount_with_currency_marker_only() {
        assert_eq!(extract_total_amount("1 200,50 ₽"), Some(1200.50));
        assert_eq!(extract_total_amount("250.00 EUR"), Some(250.0));
    }

    #[test]
    fn no_amount_no_panic() {
        assert_eq!(extract_total_amount("Доставка по договоренности"), None);
    }

    #[test]
    fn date_formats_normalize_to_iso() {
        assert_eq!(extract_date("от 15.03.2024"), Some("2024-03-15".to_string()));
        assert_eq!(extract_date("от 15/03/2024"), Some("2024-03-15".to_string()));
        assert_eq!(extract_date("2024-03-15"), Some("2024-03-15".to_string()));
        assert_eq!(
            extract_date("Счет от 5 марта 2024 г."),
            Some("2024-03-05".to_string())
        );
    }

    #[test]
    fn impossible_date_is_rejected() {
        assert_eq!(extract_date("45.13.2024"), None);
    }

    #[test]
    fn missing_date_yields_none() {
        assert_eq!(extract_date("Счет на оплату без даты"), None);
    }

    #[test]
    fn due_date_from_payment_clause() {
        assert_eq!(
            extract_due_date("Счет оплатить не позднее 20.03.2024"),
            Some("2024-03-20".to_string())
        );
    }

    #[test]
    fn invoice_number_alphanumeric_with_dash() {
        assert_eq!(
            extract_invoice_number("Счет на оплату № УТ-784 от 15.03.2024"),
            Some("УТ-784".to_string())
        );
    }

    #[test]
    fn invoice_number_letter_prefixed() {
        assert_eq!(
            extract_invoice_number("Счёт СЭ00846838 от 01.02.2024"),
            Some("СЭ00846838".to_string())
        );
    }

    #[test]
    fn invoice_number_short_numeric() {
        assert_eq!(
            extract_invoice_number("СЧЕТ № 22980 от 12.05.2024"),
            Some("22980".to_string())
        );
    }

    #[test]
    fn invoice_number_ignores_bank_account() {
        let text = "Счет № 40702810900000012345 в банке\nСчет № 784 от 01.02.2024";
        assert_eq!(extract_invoice_number(text), Some("784".to_string()));
    }

    #[test]
    fn invoice_number_ignores_bik_near_bank_details() {
        let text = "Банк получателя: ПАО Сбербанк СЧЕТ БИК № 044030653\nСчёт № 55 от 01.02.2024";
        assert_eq!(extract_invoice_number(text), Some("55".to_string()));
    }

    #[test]
    fn supplier_name_quoted_ooo() {
        assert_eq!(
            extract_supplier_name(r#"ООО "СМ Групп""#),
            Some(r#"ООО "СМ Групп""#.to_string())
        );
    }

    #[test]
    fn supplier_name_ocr_zeros_variant() {
        assert_eq!(
            extract_supplier_name(r#"000 "СМ Групп""#),
            Some(r#"ООО "СМ Групп""#.to_string())
        );
    }

    #[test]
    fn supplier_name_direct_line_wins() {
        let text = "Поставщик: ООО \"Балтийское Стекло\", ИНН 7801514385\nПокупатель: ООО \"Другая\"";
        assert_eq!(
            extract_supplier_name(text),
            Some(r#"ООО "Балтийское Стекло""#.to_string())
        );
    }

    #[test]
    fn supplier_name_individual_entrepreneur() {
        assert_eq!(
            extract_supplier_name("ИП Озеров Максим Николаевич"),
            Some("ИП Озеров Максим Николаевич".to_string())
        );
    }

    #[test]
    fn no_company_prefix_no_match() {
        assert_eq!(extract_supplier_name("Стекло и фурнитура оптом"), None);
        assert_eq!(extract_supplier_name("Банк: Сбербанк"), None);
    }

    #[test]
    fn inn_prefers_supplier_line() {
        let text = "Поставщик: ООО \"А\", ИНН 7801514385\nПокупатель ИНН 784802613697";
        assert_eq!(extract_inn(text), Some("7801514385".to_string()));
    }

    #[test]
    fn inn_from_slash_kpp_format() {
        assert_eq!(
            extract_inn("7801514385 / 780101001"),
            Some("7801514385".to_string())
        );
    }

    #[test]
    fn vat_with_rate_and_amount() {
        let (amount, rate) = extract_vat("В том числе НДС (20%): 3 172,45");
        assert_eq!(amount, Some(3172.45));
        assert_eq!(rate, Some(20.0));
    }

    #[test]
    fn vat_worded_rubles_and_kopeks() {
        let (amount, rate) = extract_vat("НДС 20% - 9 161 руб. 86 коп.");
        assert_eq!(amount, Some(9161.86));
        assert_eq!(rate, Some(20.0));
    }

    #[test]
    fn vat_mention_defaults_to_standard_rate() {
        let (amount, rate) = extract_vat("в том числе НДС");
        assert_eq!(amount, None);
        assert_eq!(rate, Some(20.0));
    }

    #[test]
    fn vat_rate_inferred_from_amounts() {
        assert_eq!(infer_vat_rate(2000.0, 12000.0), Some(20.0));
        assert_eq!(infer_vat_rate(1000.0, 11000.0), Some(10.0));
        assert_eq!(infer_vat_rate(999.0, 1000.0), None);
    }

    #[test]
    fn document_gate_accepts_invoices_and_rejects_questionnaires() {
        assert!(is_invoice_document("СЧЕТ № 784 Итого: 100 руб"));
        assert!(!is_invoice_document(
            "Анкета участника торгов, реквизиты организации"
        ));
        assert!(!is_invoice_document("Протокол совещания"));
    }

    #[test]
    fn full_extraction_on_typical_invoice() {
        let text = "Поставщик: ООО \"Балтийское Стекло\", ИНН 7801514385\n\
                    Счет на оплату № УТ-784 от 15.03.2024\n\
                    Оплатить не позднее 29.03.2024\n\
                    Итого: 54 971,20 руб.\n\
                    В том числе НДС (20%): 9 161,87";
        let parsed = extract(text);
        assert_eq!(parsed.invoice_number.as_deref(), Some("УТ-784"));
        assert_eq!(parsed.invoice_date.as_deref(), Some("2024-03-15"));
        assert_eq!(parsed.due_date.as_deref(), Some("2024-03-29"));
        assert_eq!(parsed.total_amount, Some(54971.20));
        assert_eq!(parsed.vat_amount, Some(9161.87));
        assert_eq!(parsed.vat_rate, Some(20.0));
        assert_eq!(parsed.supplier_name.as_deref(), Some("ООО \"Балтийское Стекло\""));
        assert_eq!(parsed.supplier_inn.as_deref(), Some("7801514385"));
    }

    #[test]
    fn empty_text_extracts_nothing() {
        assert_eq!(extract(""), ParsedInvoice::default());
    }

    #[test]
    fn quality_score_counts_reference_fields_only() {
        let reference = ParsedInvoice {
            invoice_number: Some("УТ-784".to_string()),
            total_amount: Some(54971.20),
            ..Default::default()
        };
        let parsed = ParsedInvoice {
            invoice_number: Some("УТ-784".to_string()),
            total_amount: Some(100.0),
            supplier_name: Some("ООО \"Лишнее\"".to_string()),
            ..Default::default()
        };
        assert_eq!(quality_score(&parsed, &reference), Some(50.0));
        assert_eq!(
            quality_score(&ParsedInvoice::default(), &ParsedInvoice::default()),
            None
        );
    }
}
