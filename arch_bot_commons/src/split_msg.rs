/// Length of this string the way Telegram counts it, in UTF-16 code units.
#[must_use]
pub fn telegram_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Byte index at which the longest prefix of `text` that fits in
/// `max_units` UTF-16 code units ends. Always on a char boundary.
fn prefix_end(text: &str, max_units: usize) -> usize {
    let mut units = 0;
    for (index, chr) in text.char_indices() {
        units += chr.len_utf16();
        if units > max_units {
            return index;
        }
    }
    text.len()
}

/// Split `text` into pieces that are each at most `max_units` UTF-16 code
/// units long, as Telegram measures messages.
///
/// Prefers to split on paragraphs, then lines, then words, and only cuts
/// in the middle of a word if there's no other choice. Whitespace around
/// the cut is dropped. Text that already fits comes back as a single
/// (trimmed) piece. Empty text yields no pieces.
///
/// # Panics
///
/// Panics if `max_units` is less than 2, as then a single character
/// might not fit.
#[must_use]
pub fn split_for_telegram(text: &str, max_units: usize) -> Vec<&str> {
    assert!(max_units >= 2, "Tried to split with maximum length less than a character");

    let mut pieces = Vec::new();
    let mut rest = text.trim();

    while telegram_len(rest) > max_units {
        let hard_end = prefix_end(rest, max_units);
        let window = &rest[..hard_end];

        // Paragraph, then line, then word. Position 0 is useless since `rest` is trimmed.
        let cut = [window.rfind("\n\n"), window.rfind('\n')]
            .into_iter()
            .flatten()
            .find(|&x| x > 0)
            .or_else(|| window.rfind(char::is_whitespace).filter(|&x| x > 0))
            .unwrap_or(hard_end);

        let piece = rest[..cut].trim_end();
        if !piece.is_empty() {
            pieces.push(piece);
        }
        rest = rest[cut..].trim_start();
    }

    if !rest.is_empty() {
        pieces.push(rest);
    }

    pieces
}
