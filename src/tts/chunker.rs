//! Разбиение текста на фрагменты допустимой для сервиса длины
//!
//! Длина считается в символах, а не байтах, поэтому разрез никогда не
//! попадает внутрь многобайтового символа.

/// Максимальная длина фрагмента по умолчанию
pub const DEFAULT_MAX_LENGTH: usize = 180;

fn is_break_punctuation(c: char) -> bool {
    matches!(c, '.' | ',' | ';' | '!' | '?')
}

/// Разбить текст на фрагменты длиной не более `max_len` символов.
///
/// Внутри окна ищется последний знак препинания, затем последний пробел;
/// если нет ни того ни другого, слово режется ровно по границе окна.
/// Фрагменты обрезаются по краям, пустые отбрасываются.
pub fn split_text(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let mut pieces = Vec::new();
    let mut rest: Vec<char> = text.trim().chars().collect();

    while rest.len() > max_len {
        let window = &rest[..max_len];
        let split_at = window
            .iter()
            .rposition(|&c| is_break_punctuation(c))
            .or_else(|| window.iter().rposition(|&c| c == ' '))
            .map(|i| i + 1)
            .unwrap_or(max_len);

        let piece: String = rest[..split_at].iter().collect();
        push_trimmed(&mut pieces, &piece);

        let remainder: String = rest[split_at..].iter().collect();
        rest = remainder.trim().chars().collect();
    }

    let tail: String = rest.into_iter().collect();
    push_trimmed(&mut pieces, &tail);
    pieces
}

fn push_trimmed(pieces: &mut Vec<String>, piece: &str) {
    let trimmed = piece.trim();
    if !trimmed.is_empty() {
        pieces.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_punctuation_split() {
        assert_eq!(split_text("Hello, world. Bye.", 10), vec!["Hello,", "world.", "Bye."]);
    }

    #[test]
    fn test_short_text_is_single_piece() {
        assert_eq!(split_text("Xin chào", 180), vec!["Xin chào"]);
        assert!(split_text("   ", 180).is_empty());
    }

    #[test]
    fn test_space_split_when_no_punctuation() {
        assert_eq!(split_text("alpha beta gamma", 11), vec!["alpha beta", "gamma"]);
    }

    #[test]
    fn test_force_split_long_word() {
        assert_eq!(split_text("abcdefghijkl", 5), vec!["abcde", "fghij", "kl"]);
    }

    #[test]
    fn test_multibyte_text() {
        let text = "Tôi đã đến đây rồi và tôi sẽ ở lại thêm một chút nữa nhé";
        let pieces = split_text(text, 12);
        assert!(pieces.iter().all(|p| p.chars().count() <= 12));
        assert_eq!(normalize(&pieces.join(" ")), normalize(text));
    }

    #[test]
    fn test_rejoin_reproduces_text() {
        let text = "Một ngày nọ, có một chàng trai trẻ đi vào rừng sâu; anh ấy tìm thấy một ngôi nhà cũ! \
                    Bên trong có gì? Không ai biết cả. Supercalifragilisticexpialidocious là một từ dài.";
        for max in [5, 10, 17, 40, 180] {
            let pieces = split_text(text, max);
            assert!(pieces.iter().all(|p| !p.is_empty() && p.chars().count() <= max));
            assert_eq!(normalize(&pieces.join(" ")).replace(' ', ""), normalize(text).replace(' ', ""));
        }
    }
}
