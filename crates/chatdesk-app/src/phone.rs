// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

/// Fewest digits a phone number may carry once punctuation is stripped.
pub const MIN_PHONE_DIGITS: usize = 8;

pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

pub fn has_valid_phone_digits(raw: &str) -> bool {
    digits_only(raw).len() >= MIN_PHONE_DIGITS
}

/// Formats `15551234567` as `+1 5551 234567`. Numbers with fewer than ten
/// digits are returned unchanged; exactly ten digits get no country prefix.
pub fn format_phone_number(raw: &str) -> String {
    let digits = digits_only(raw);
    if digits.len() < 10 {
        return raw.to_owned();
    }
    let split = digits.len() - 10;
    if split == 0 {
        return format!("{} {}", &digits[..4], &digits[4..]);
    }
    format!(
        "+{} {} {}",
        &digits[..split],
        &digits[split..split + 4],
        &digits[split + 4..]
    )
}

/// Click-to-chat link for the candidate's WhatsApp conversation.
pub fn whatsapp_link(raw: &str) -> String {
    format!("https://wa.me/{}", digits_only(raw))
}
