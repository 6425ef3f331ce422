/// Derive a URL-safe slug from a display name.
///
/// Lowercases, folds common Latin accents, spells `&` as `and`, drops apostrophes
/// and collapses every other run of non-alphanumerics into a single `-`.
/// Leading/trailing separators are trimmed. Deterministic and allocation-light.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;

    for ch in name.chars() {
        match ch {
            '\'' | '\u{2019}' | '\u{2018}' => continue,
            '&' => {
                pending_sep = true;
                push_word(&mut out, "and", &mut pending_sep);
                pending_sep = true;
            }
            c if c.is_ascii_alphanumeric() => {
                let mut buf = [0u8; 4];
                let lower = c.to_ascii_lowercase();
                push_word(&mut out, lower.encode_utf8(&mut buf), &mut pending_sep);
            }
            c => match fold_accent(c) {
                Some(folded) => push_word(&mut out, folded, &mut pending_sep),
                None => pending_sep = true,
            },
        }
    }

    out
}

fn push_word(out: &mut String, word: &str, pending_sep: &mut bool) {
    if *pending_sep && !out.is_empty() {
        out.push('-');
    }
    *pending_sep = false;
    out.push_str(word);
}

/// Storefront slugs use `_` as a word separator; the CMS expects `-`.
pub fn game_slug(listing_slug: &str) -> String {
    listing_slug.replace('_', "-")
}

fn fold_accent(c: char) -> Option<&'static str> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => "a",
        'æ' | 'Æ' => "ae",
        'ç' | 'Ç' => "c",
        'è' | 'é' | 'ê' | 'ë' | 'È' | 'É' | 'Ê' | 'Ë' => "e",
        'ì' | 'í' | 'î' | 'ï' | 'Ì' | 'Í' | 'Î' | 'Ï' => "i",
        'ñ' | 'Ñ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' => "o",
        'œ' | 'Œ' => "oe",
        'ù' | 'ú' | 'û' | 'ü' | 'Ù' | 'Ú' | 'Û' | 'Ü' => "u",
        'ý' | 'ÿ' | 'Ý' => "y",
        'ß' => "ss",
        _ => return None,
    };
    Some(folded)
}
