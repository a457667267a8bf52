/// Turn free text into a URL slug: lowercase ASCII, digits, single dashes.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for ch in text.chars().flat_map(char::to_lowercase) {
        let folded = fold_latin(ch);
        let mut pushed = false;
        for c in folded.chars() {
            if c.is_ascii_alphanumeric() {
                if pending_dash && !slug.is_empty() {
                    slug.push('-');
                }
                pending_dash = false;
                slug.push(c);
                pushed = true;
            }
        }
        if !pushed {
            pending_dash = true;
        }
    }

    slug
}

/// First free slug for `base` given the slugs already in use.
/// Collisions get a numeric suffix starting at 2.
pub fn unique_slug<'a, I>(base: &str, fallback: &str, taken: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let base = if base.is_empty() { fallback } else { base };
    let taken: std::collections::HashSet<&str> = taken.into_iter().collect();

    if !taken.contains(base) {
        return base.to_string();
    }

    let mut counter = 2u32;
    loop {
        let candidate = format!("{}-{}", base, counter);
        if !taken.contains(candidate.as_str()) {
            return candidate;
        }
        counter += 1;
    }
}

fn fold_latin(ch: char) -> String {
    let folded = match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'æ' => "ae",
        'ç' | 'ć' | 'č' => "c",
        'ď' | 'đ' | 'ð' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ę' | 'ě' => "e",
        'ğ' => "g",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'ı' => "i",
        'ł' | 'ľ' => "l",
        'ñ' | 'ń' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'œ' => "oe",
        'ř' => "r",
        'ß' => "ss",
        'ś' | 'š' | 'ş' => "s",
        'ť' | 'ţ' => "t",
        'þ' => "th",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        '&' => "and",
        _ => return ch.to_string(),
    };
    folded.to_string()
}
