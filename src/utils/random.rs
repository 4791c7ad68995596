use rand::seq::IndexedRandom;
use rand::Rng;

/// Cursor colors handed out to users as they join. Two users may share a color.
pub const COLOR_PALETTE: [&str; 8] = [
    "#C72626", // red
    "#1C978F", // teal
    "#1E7D92", // blue
    "#B3471D", // orange
    "#24B792", // green
    "#CBAA27", // yellow
    "#9A26CB", // purple
    "#278BC1", // sky blue
];

/// Random lowercase hex string of `len` characters.
pub fn random_hex(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| char::from_digit(rng.random_range(0..16u32), 16).unwrap_or('0'))
        .collect()
}

/// Ephemeral identifier for one connection.
pub fn user_id() -> String {
    random_hex(16)
}

pub fn user_color() -> String {
    COLOR_PALETTE
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(COLOR_PALETTE[0])
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_hex_has_requested_length() {
        for len in [1, 6, 16] {
            let id = random_hex(len);
            assert_eq!(id.len(), len);
            assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn colors_come_from_palette() {
        for _ in 0..32 {
            assert!(COLOR_PALETTE.contains(&user_color().as_str()));
        }
    }

    #[test]
    fn user_ids_differ() {
        assert_ne!(user_id(), user_id());
    }
}
