pub mod config_cmd;
pub mod run;
pub mod serve;
pub mod status;

use std::collections::HashSet;

/// Parse a comma-separated weekday list. Accepts day names (full or
/// three-letter) and digits 0=Sunday..6=Saturday.
pub fn parse_days(input: &str) -> anyhow::Result<HashSet<u8>> {
    const NAMES: &[&str] = &[
        "sunday",
        "monday",
        "tuesday",
        "wednesday",
        "thursday",
        "friday",
        "saturday",
    ];

    let mut days = HashSet::new();
    for token in input.split(',') {
        let token = token.trim().to_lowercase();
        if token.is_empty() {
            continue;
        }
        if let Ok(n) = token.parse::<u8>() {
            if n > 6 {
                anyhow::bail!("weekday number out of range (0..6): {n}");
            }
            days.insert(n);
            continue;
        }
        let matched = NAMES
            .iter()
            .position(|name| name.starts_with(&token) && token.len() >= 3);
        match matched {
            Some(idx) => {
                days.insert(idx as u8);
            }
            None => anyhow::bail!("unrecognized weekday: {token}"),
        }
    }
    if days.is_empty() {
        anyhow::bail!("no weekdays given");
    }
    Ok(days)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numbers_and_names() {
        let days = parse_days("1, 3, fri").unwrap();
        assert_eq!(days, HashSet::from([1, 3, 5]));

        let days = parse_days("monday,tuesday").unwrap();
        assert_eq!(days, HashSet::from([1, 2]));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_days("someday").is_err());
        assert!(parse_days("7").is_err());
        assert!(parse_days("").is_err());
        // Two-letter prefixes are ambiguous (su/sa, tu/th).
        assert!(parse_days("tu").is_err());
    }
}
