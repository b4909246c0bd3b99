use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::audio::track::Track;

/// Colour palette shared by every embed.
pub mod colors {
    use serenity::all::Colour;

    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

const STANDARD_FOOTER: &str = "🎵 Personal Player";

/// Pending tracks shown per `/queue` reply.
const MAX_LISTED: usize = 20;

/// Numbered pending titles, truncated to [`MAX_LISTED`] lines.
pub fn queue_listing(titles: &[String]) -> String {
    let mut listing: String = titles
        .iter()
        .take(MAX_LISTED)
        .enumerate()
        .map(|(i, title)| format!("{}. {}\n", i + 1, title))
        .collect();

    if titles.len() > MAX_LISTED {
        listing.push_str(&format!("…and {} more\n", titles.len() - MAX_LISTED));
    }
    listing
}

/// Embed for `/queue`: the current track and what comes next.
pub fn create_queue_embed(current: Option<&Track>, titles: &[String]) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Queue")
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now());

    if let Some(current) = current {
        let value = match current.source_url() {
            Some(url) => format!("**[{current}]({url})**"),
            None => format!("**{current}**"),
        };
        embed = embed.field("▶️ Now playing", value, false);
    }

    if titles.is_empty() {
        embed
            .description("Queue is empty.")
            .color(colors::NEUTRAL_GRAY)
    } else {
        embed.description(queue_listing(titles))
    }
}
