//! Prompt enrichment for storyboard shots.
//!
//! Pure functions of `(shot, locations, characters)`. A shot's location and
//! character names are matched against the run context case-insensitively,
//! in either direction ("Harbor" matches "Old Harbor at night" and vice
//! versa).

use shotline_models::{Character, Location, Shot};

const SEPARATOR: &str = ", ";

fn names_match(candidate: &str, wanted: &str) -> bool {
    let candidate = candidate.trim().to_lowercase();
    let wanted = wanted.trim().to_lowercase();
    if candidate.is_empty() || wanted.is_empty() {
        return false;
    }
    candidate.contains(&wanted) || wanted.contains(&candidate)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// First location whose name matches the shot's location field.
pub fn match_location<'a>(shot: &Shot, locations: &'a [Location]) -> Option<&'a Location> {
    let wanted = non_empty(shot.location.as_deref())?;
    locations.iter().find(|loc| names_match(&loc.name, wanted))
}

/// Characters named by the shot, first match per name, without duplicates.
pub fn match_characters<'a>(shot: &Shot, characters: &'a [Character]) -> Vec<&'a Character> {
    let mut matched: Vec<&Character> = Vec::new();
    for name in shot.character_names() {
        let Some(found) = characters.iter().find(|c| names_match(&c.name, name)) else {
            continue;
        };
        if !matched.iter().any(|c| c.id == found.id) {
            matched.push(found);
        }
    }
    matched
}

/// Build the enriched prompt for a shot.
///
/// Parts, in order and only when non-empty: the generation prompt (falling
/// back to the description), the matched location's description, each
/// matched character's description, then camera and movement annotations.
pub fn build_prompt(shot: &Shot, locations: &[Location], characters: &[Character]) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(base) = non_empty(shot.generation_prompt.as_deref())
        .or_else(|| non_empty(Some(shot.description.as_str())))
    {
        parts.push(base.to_string());
    }

    if let Some(location) = match_location(shot, locations) {
        if let Some(desc) = non_empty(Some(location.description.as_str())) {
            parts.push(format!("Location: {}", desc));
        }
    }

    for character in match_characters(shot, characters) {
        if let Some(desc) = non_empty(Some(character.description.as_str())) {
            parts.push(format!("{}: {}", character.name.trim(), desc));
        }
    }

    if let Some(camera) = non_empty(shot.camera.as_deref()) {
        parts.push(format!("Camera: {}", camera));
    }
    if let Some(movement) = non_empty(shot.movement.as_deref()) {
        parts.push(format!("Movement: {}", movement));
    }

    parts.join(SEPARATOR)
}

/// Reference images for a shot: the first image of the matched location and
/// the first image of each matched character.
pub fn collect_reference_images(
    shot: &Shot,
    locations: &[Location],
    characters: &[Character],
) -> Vec<String> {
    let location_image = match_location(shot, locations).and_then(|loc| loc.reference_images.first());
    let character_images = match_characters(shot, characters)
        .into_iter()
        .filter_map(|c| c.reference_images.first());

    location_image.into_iter().chain(character_images).cloned().collect()
}
