use crate::models::{SpeakerRecord, UserProfile};

/// Default cap on the number of bio characters sent per request
pub const DEFAULT_BIO_CHAR_LIMIT: usize = 800;

const SYSTEM_PROMPT: &str = "You are a strategic business advisor rating conference \
networking opportunities. Always respond with a single valid JSON object.";

/// Request payload for scoring one speaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringPrompt {
    pub speaker_id: String,
    pub system: String,
    pub user: String,
}

/// Build the scoring request for one (profile, speaker) pair
///
/// Pure and deterministic. The speaker bio is cut to `bio_char_limit`
/// characters to bound request cost.
pub fn build_prompt(
    profile: &UserProfile,
    speaker: &SpeakerRecord,
    bio_char_limit: usize,
) -> ScoringPrompt {
    debug_assert!(!speaker.id.is_empty(), "speaker records must carry an id");

    let user = format!(
        r#"Be strict and selective when judging whether this attendee should seek out this speaker.

ATTENDEE BUSINESS / GOALS:
{profile}

SPEAKER:
Name: {name}
Title: {title}
Organization: {organization}
Bio: {bio}

Weigh these criteria:
1. Direct relevance to the attendee's product, technology or market (40%)
2. Influence over purchasing, budget or program decisions (30%)
3. A concrete next step the conversation could lead to (20%)
4. Value for both sides (10%)

Scale:
- 9-10: decision-maker with an immediate need for the attendee's offering
- 7-8: strong expertise and influence, likely concrete opportunity
- 5-6: indirect relevance, mostly informational
- 3-4: tangential connection
- 0-2: no meaningful connection

Reserve 9-10 for exceptional alignment; most useful matches land between 5 and 7.

Return ONLY a JSON object:
{{"score": <number from 0 to 10>, "reasoning": "<2-3 sentences justifying the score>"}}"#,
        profile = profile.text.trim(),
        name = or_na(&speaker.name),
        title = or_na(&speaker.title),
        organization = or_na(&speaker.organization),
        bio = or_na(truncate_chars(&speaker.bio, bio_char_limit)),
    );

    ScoringPrompt {
        speaker_id: speaker.id.clone(),
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}

/// Cut `text` to at most `max_chars` characters without splitting a code point
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

#[inline]
fn or_na(value: &str) -> &str {
    if value.trim().is_empty() {
        "N/A"
    } else {
        value
    }
}
