//! Points-based aggregation of ranked ballots.

use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{
    participant::Participant,
    results::{CountryResult, VoteAttribution},
    vote::{MAX_BALLOT_LEN, Vote},
};

/// Points for a zero-based ballot position: 5 for the top choice down to 1.
pub fn points_for_position(index: usize) -> u32 {
    MAX_BALLOT_LEN.saturating_sub(index) as u32
}

/// Turns a session's ballots into a ranking.
///
/// Every ballot position awards [`points_for_position`] to its country.
/// Ballots whose participant is not in `participants` are ignored. The
/// result holds each country that received a vote, ordered by descending
/// score with ties broken alphabetically by country code. Attributions
/// follow the order of `votes`.
pub fn tally(votes: &[Vote], participants: &[Participant]) -> Vec<CountryResult> {
    let usernames: HashMap<Uuid, &str> = participants
        .iter()
        .map(|p| (p.id, p.username.as_str()))
        .collect();

    let mut by_country: HashMap<&str, CountryResult> = HashMap::new();

    for vote in votes {
        let Some(username) = usernames.get(&vote.participant_id) else {
            continue;
        };

        for (index, country) in vote.countries.iter().enumerate().take(MAX_BALLOT_LEN) {
            let points = points_for_position(index);
            let entry = by_country
                .entry(country.as_str())
                .or_insert_with(|| CountryResult {
                    country: country.clone(),
                    score: 0,
                    votes: Vec::new(),
                });

            entry.score += points;
            entry.votes.push(VoteAttribution {
                participant_id: vote.participant_id,
                username: username.to_string(),
                rank: index as u32 + 1,
                points,
            });
        }
    }

    let mut results: Vec<CountryResult> = by_country.into_values().collect();
    results.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.country.cmp(&b.country)));
    results
}
