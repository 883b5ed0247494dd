//! Property tests for history eviction and follow-up context

use proptest::prelude::*;

use qa_assistant_agent::{ConversationHistory, HistorySnapshot};
use qa_assistant_core::{Document, Turn};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn history_keeps_the_most_recent_turns(limit in 1usize..20, count in 0usize..60) {
        let history = ConversationHistory::new(Some(limit));
        for i in 0..count {
            history.push(Turn::user(format!("turn {}", i)));
        }

        let turns = history.turns();
        prop_assert_eq!(turns.len(), count.min(limit));
        let first = count.saturating_sub(limit);
        for (offset, turn) in turns.iter().enumerate() {
            prop_assert_eq!(&turn.text, &format!("turn {}", first + offset));
        }
    }

    #[test]
    fn unrelated_query_falls_back_to_last_answer(
        doc_ids in proptest::collection::vec(proptest::collection::vec(0u64..100, 0..4), 1..6),
    ) {
        let mut turns = Vec::new();
        for (i, ids) in doc_ids.iter().enumerate() {
            turns.push(Turn::user(format!("domanda numero {}", i)));
            let docs = ids.iter().map(|id| Document::new(*id, format!("documento {}", id))).collect();
            turns.push(Turn::assistant(format!("risposta numero {}", i), docs));
        }

        let snapshot = HistorySnapshot::new(turns).with_pending(Turn::user("zzz qqq"));
        let context = snapshot.followup_context(0.3).unwrap();

        let expected: Vec<u64> = doc_ids.last().cloned().unwrap_or_default();
        let actual: Vec<u64> = context.iter().map(|d| d.id).collect();
        prop_assert_eq!(actual, expected);
    }
}
