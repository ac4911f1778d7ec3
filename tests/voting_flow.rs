use chrono::{Duration, Utc};
use uuid::Uuid;

use tripvote::{
    error::AppError,
    events::SessionEventKind,
    models::session::{Session, SessionStatus},
    services::{participants, sessions, sweeper, votes},
    state::AppState,
};

fn countries(codes: &[&str]) -> Vec<String> {
    codes.iter().map(|c| c.to_string()).collect()
}

async fn insert_backdated(
    state: &AppState,
    created_days_ago: i64,
    completed_days_ago: Option<i64>,
) -> Uuid {
    let now = Utc::now();
    let session = Session {
        id: Uuid::new_v4(),
        creator_id: "creator".to_string(),
        creator_name: None,
        max_participants: 2,
        status: if completed_days_ago.is_some() {
            SessionStatus::Completed
        } else {
            SessionStatus::Waiting
        },
        created_at: now - Duration::days(created_days_ago),
        completed_at: completed_days_ago.map(|d| now - Duration::days(d)),
        origin_country: None,
    };

    let mut tx = state.store.begin().await.unwrap();
    tx.insert_session(&session).await.unwrap();
    tx.commit().await.unwrap();
    session.id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_two_person_session_end_to_end() {
        let state = AppState::in_memory();

        // Step 1: Create a two-person session
        let created = sessions::create_session(&state, 2, None, None).await.unwrap();
        assert!(created.participant_id.is_none());
        let session_id = created.session_id;

        // Step 2: Both participants join, the second join opens voting
        let alice = participants::join(&state, session_id, "Alice").await.unwrap();
        let view = sessions::get_session(&state, session_id).await.unwrap().unwrap();
        assert_eq!(view.session.status, SessionStatus::Waiting);

        let bob = participants::join(&state, session_id, "Bob").await.unwrap();
        let view = sessions::get_session(&state, session_id).await.unwrap().unwrap();
        assert_eq!(view.session.status, SessionStatus::Voting);
        assert_eq!(view.participants.len(), 2);

        // Step 3: Ballots of different lengths
        votes::submit(&state, session_id, alice.id, &countries(&["FR", "JP", "DE"]))
            .await
            .unwrap();
        votes::submit(&state, session_id, bob.id, &countries(&["JP", "FR"]))
            .await
            .unwrap();

        // Step 4: Ranking, with the FR/JP tie broken by country code
        let results = sessions::get_results(&state, session_id).await.unwrap().unwrap();
        let ranking: Vec<(&str, u32)> = results
            .results
            .iter()
            .map(|r| (r.country.as_str(), r.score))
            .collect();
        assert_eq!(ranking, vec![("FR", 9), ("JP", 9), ("DE", 3)]);

        // Step 5: Reveal
        let session = sessions::reveal_results(&state, session_id, &created.creator_id)
            .await
            .unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.completed_at.is_some());

        // Step 6: Voting is closed afterwards
        let late = votes::submit(&state, session_id, bob.id, &countries(&["DE"])).await;
        assert!(matches!(late, Err(AppError::PreconditionFailed(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_never_exceed_capacity() {
        let state = AppState::in_memory();
        let created = sessions::create_session(&state, 3, None, None).await.unwrap();
        let session_id = created.session_id;

        participants::join(&state, session_id, "Alice").await.unwrap();
        participants::join(&state, session_id, "Bob").await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                participants::join(&state, session_id, &format!("guest{}", i)).await
            }));
        }

        let mut joined = 0;
        let mut full = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => joined += 1,
                Err(AppError::PreconditionFailed(_)) => full += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(joined, 1);
        assert_eq!(full, 7);

        let view = sessions::get_session(&state, session_id).await.unwrap().unwrap();
        assert_eq!(view.participants.len(), 3);
        assert_eq!(view.session.status, SessionStatus::Voting);
    }

    #[tokio::test]
    async fn test_usernames_are_unique_ignoring_case() {
        let state = AppState::in_memory();
        let created = sessions::create_session(&state, 4, None, None).await.unwrap();

        participants::join(&state, created.session_id, "Alice").await.unwrap();
        let duplicate = participants::join(&state, created.session_id, "alice").await;

        assert!(matches!(duplicate, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_creator_name_joins_the_creator() {
        let state = AppState::in_memory();
        let created = sessions::create_session(&state, 3, Some("fr".to_string()), Some("Maya".to_string()))
            .await
            .unwrap();

        let participant_id = created.participant_id.unwrap();
        let view = sessions::get_session(&state, created.session_id).await.unwrap().unwrap();
        assert_eq!(view.participants[0].id, participant_id);
        assert_eq!(view.session.origin_country.as_deref(), Some("FR"));

        let home = votes::submit(&state, created.session_id, participant_id, &countries(&["JP", "FR"])).await;
        assert!(matches!(home, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_resubmitting_a_ballot_keeps_one_vote() {
        let state = AppState::in_memory();
        let created = sessions::create_session(&state, 3, None, None).await.unwrap();
        let alice = participants::join(&state, created.session_id, "Alice").await.unwrap();

        let first = votes::submit(&state, created.session_id, alice.id, &countries(&["IT", "ES"]))
            .await
            .unwrap();
        let second = votes::submit(&state, created.session_id, alice.id, &countries(&["IT", "ES"]))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);

        let edited = votes::submit(&state, created.session_id, alice.id, &countries(&["pt"]))
            .await
            .unwrap();
        assert_eq!(edited.id, first.id);

        let view = sessions::get_session(&state, created.session_id).await.unwrap().unwrap();
        assert_eq!(view.votes.len(), 1);
        assert_eq!(view.votes[0].countries, countries(&["PT"]));
        assert!(view.participants[0].has_voted);

        let ballot = votes::get_by_participant(&state, alice.id).await.unwrap();
        assert_eq!(ballot, Some(countries(&["PT"])));
    }

    #[tokio::test]
    async fn test_reveal_requires_a_vote_and_the_creator() {
        let state = AppState::in_memory();
        let created = sessions::create_session(&state, 3, None, None).await.unwrap();
        let session_id = created.session_id;
        let alice = participants::join(&state, session_id, "Alice").await.unwrap();

        let early = sessions::reveal_results(&state, session_id, &created.creator_id).await;
        assert!(matches!(early, Err(AppError::PreconditionFailed(_))));

        votes::submit(&state, session_id, alice.id, &countries(&["GR"])).await.unwrap();

        let stranger = sessions::reveal_results(&state, session_id, "not-the-creator").await;
        assert!(matches!(stranger, Err(AppError::PermissionDenied(_))));
        let view = sessions::get_session(&state, session_id).await.unwrap().unwrap();
        assert_eq!(view.session.status, SessionStatus::Waiting);

        let revealed = sessions::reveal_results(&state, session_id, &created.creator_id)
            .await
            .unwrap();
        let again = sessions::reveal_results(&state, session_id, &created.creator_id)
            .await
            .unwrap();
        assert_eq!(again.status, SessionStatus::Completed);
        assert_eq!(again.completed_at, revealed.completed_at);
    }

    #[tokio::test]
    async fn test_removed_participant_leaves_the_ranking() {
        let state = AppState::in_memory();
        let created = sessions::create_session(&state, 3, None, None).await.unwrap();
        let session_id = created.session_id;
        let alice = participants::join(&state, session_id, "Alice").await.unwrap();
        let bob = participants::join(&state, session_id, "Bob").await.unwrap();

        votes::submit(&state, session_id, alice.id, &countries(&["FR"])).await.unwrap();
        votes::submit(&state, session_id, bob.id, &countries(&["JP"])).await.unwrap();

        let denied = participants::remove(&state, session_id, bob.id, "nope").await;
        assert!(matches!(denied, Err(AppError::PermissionDenied(_))));

        participants::remove(&state, session_id, bob.id, &created.creator_id)
            .await
            .unwrap();

        let results = sessions::get_results(&state, session_id).await.unwrap().unwrap();
        assert_eq!(results.participants.len(), 1);
        assert_eq!(results.results.len(), 1);
        assert_eq!(results.results[0].country, "FR");
        assert!(participants::get_status(&state, bob.id).await.unwrap().is_none());
        assert!(votes::get_by_participant(&state, bob.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset_deletes_the_ballot() {
        let state = AppState::in_memory();
        let created = sessions::create_session(&state, 3, None, None).await.unwrap();
        let session_id = created.session_id;
        let alice = participants::join(&state, session_id, "Alice").await.unwrap();

        votes::submit(&state, session_id, alice.id, &countries(&["NO", "SE"])).await.unwrap();
        participants::reset_vote(&state, session_id, alice.id, &created.creator_id)
            .await
            .unwrap();

        let status = participants::get_status(&state, alice.id).await.unwrap().unwrap();
        assert!(!status.has_voted);
        assert!(votes::get_by_participant(&state, alice.id).await.unwrap().is_none());
        let results = sessions::get_results(&state, session_id).await.unwrap().unwrap();
        assert!(results.results.is_empty());
    }

    #[tokio::test]
    async fn test_list_sessions_keeps_request_order() {
        let state = AppState::in_memory();
        let first = sessions::create_session(&state, 2, None, None).await.unwrap();
        let second = sessions::create_session(&state, 5, None, None).await.unwrap();
        participants::join(&state, second.session_id, "Alice").await.unwrap();

        let summaries = sessions::list_sessions(
            &state,
            &[second.session_id, Uuid::new_v4(), first.session_id],
        )
        .await
        .unwrap();

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, second.session_id);
        assert_eq!(summaries[0].participant_count, 1);
        assert_eq!(summaries[1].id, first.session_id);

        let too_many: Vec<Uuid> = (0..51).map(|_| Uuid::new_v4()).collect();
        assert!(matches!(
            sessions::list_sessions(&state, &too_many).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_retention_sweep_deletes_only_expired_sessions() {
        let state = AppState::in_memory();

        let old_completed = insert_backdated(&state, 30, Some(8)).await;
        let recent_completed = insert_backdated(&state, 30, Some(6)).await;
        let abandoned = insert_backdated(&state, 15, None).await;
        let recent_open = insert_backdated(&state, 13, None).await;

        let report = sweeper::sweep_expired_sessions(&state, Utc::now()).await.unwrap();
        assert_eq!(report.deleted_count, 2);
        assert_eq!(report.completed_count, 1);
        assert_eq!(report.abandoned_count, 1);
        assert_eq!(report.failed_count, 0);

        assert!(sessions::get_session(&state, old_completed).await.unwrap().is_none());
        assert!(sessions::get_session(&state, abandoned).await.unwrap().is_none());
        assert!(sessions::get_session(&state, recent_completed).await.unwrap().is_some());
        assert!(sessions::get_session(&state, recent_open).await.unwrap().is_some());

        let rerun = sweeper::sweep_expired_sessions(&state, Utc::now()).await.unwrap();
        assert_eq!(rerun.deleted_count, 0);
    }

    #[tokio::test]
    async fn test_sweep_removes_participants_and_votes() {
        let state = AppState::in_memory();
        let created = sessions::create_session(&state, 2, None, None).await.unwrap();
        let alice = participants::join(&state, created.session_id, "Alice").await.unwrap();
        votes::submit(&state, created.session_id, alice.id, &countries(&["CH"])).await.unwrap();

        let later = Utc::now() + Duration::days(15);
        let report = sweeper::sweep_expired_sessions(&state, later).await.unwrap();
        assert_eq!(report.deleted_count, 1);

        assert!(participants::get_status(&state, alice.id).await.unwrap().is_none());
        assert!(votes::get_by_participant(&state, alice.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_join_unknown_session_is_not_found() {
        let state = AppState::in_memory();

        let result = participants::join(&state, Uuid::new_v4(), "Alice").await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_reset_after_reveal_is_rejected() {
        let state = AppState::in_memory();
        let created = sessions::create_session(&state, 3, None, None).await.unwrap();
        let session_id = created.session_id;
        let alice = participants::join(&state, session_id, "Alice").await.unwrap();

        votes::submit(&state, session_id, alice.id, &countries(&["HR", "SI"])).await.unwrap();
        sessions::reveal_results(&state, session_id, &created.creator_id)
            .await
            .unwrap();

        let reset = participants::reset_vote(&state, session_id, alice.id, &created.creator_id).await;
        assert!(matches!(reset, Err(AppError::PreconditionFailed(_))));

        let status = participants::get_status(&state, alice.id).await.unwrap().unwrap();
        assert!(status.has_voted);
        assert_eq!(
            votes::get_by_participant(&state, alice.id).await.unwrap(),
            Some(countries(&["HR", "SI"]))
        );
    }

    #[tokio::test]
    async fn test_participant_of_another_session_is_not_found() {
        let state = AppState::in_memory();
        let first = sessions::create_session(&state, 3, None, None).await.unwrap();
        let second = sessions::create_session(&state, 3, None, None).await.unwrap();
        let outsider = participants::join(&state, second.session_id, "Bob").await.unwrap();

        let submit = votes::submit(&state, first.session_id, outsider.id, &countries(&["FR"])).await;
        assert!(matches!(submit, Err(AppError::NotFound(_))));

        let remove = participants::remove(&state, first.session_id, outsider.id, &first.creator_id).await;
        assert!(matches!(remove, Err(AppError::NotFound(_))));

        let reset = participants::reset_vote(&state, first.session_id, outsider.id, &first.creator_id).await;
        assert!(matches!(reset, Err(AppError::NotFound(_))));

        let status = participants::get_status(&state, outsider.id).await.unwrap().unwrap();
        assert_eq!(status.session_id, second.session_id);
        assert!(!status.has_voted);
    }

    #[tokio::test]
    async fn test_committed_changes_are_published() {
        let state = AppState::in_memory();
        let mut events = state.events.subscribe();

        let created = sessions::create_session(&state, 2, None, None).await.unwrap();
        let alice = participants::join(&state, created.session_id, "Alice").await.unwrap();
        participants::join(&state, created.session_id, "Bob").await.unwrap();
        votes::submit(&state, created.session_id, alice.id, &countries(&["FR"])).await.unwrap();

        let rejected = participants::join(&state, created.session_id, "Carol").await;
        assert!(rejected.is_err());

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            assert_eq!(event.session_id, created.session_id);
            kinds.push(event.kind);
        }

        assert_eq!(
            kinds,
            vec![
                SessionEventKind::Created,
                SessionEventKind::ParticipantJoined,
                SessionEventKind::ParticipantJoined,
                SessionEventKind::StatusChanged,
                SessionEventKind::VoteSubmitted,
            ]
        );
    }
}
