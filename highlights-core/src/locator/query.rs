use crate::events::Event;

/// Search phrasings for one fixture, most specific first, without duplicates.
pub fn build_query_variants(event: &Event) -> Vec<String> {
    let away = event.away_team.trim();
    let home = event.home_team.trim();
    let sport = event.sport.trim();
    let date = event.fixture_date().format("%Y-%m-%d");

    let mut variants = vec![
        format!("{away} vs {home} highlights {date}"),
        format!("{away} vs {home} full game highlights"),
    ];
    if !sport.is_empty() {
        variants.push(format!("{away} vs {home} {sport} highlights"));
    }
    variants.push(format!("{away} {home} highlights"));

    let mut unique: Vec<String> = Vec::with_capacity(variants.len());
    for variant in variants {
        if !unique.iter().any(|seen| seen.eq_ignore_ascii_case(&variant)) {
            unique.push(variant);
        }
    }
    unique
}

/// Case-insensitive substring match against any non-empty keyword.
pub fn title_matches(title: &str, keywords: &[String]) -> bool {
    let title = title.to_lowercase();
    keywords
        .iter()
        .map(|keyword| keyword.trim().to_lowercase())
        .filter(|keyword| !keyword.is_empty())
        .any(|keyword| title.contains(&keyword))
}
