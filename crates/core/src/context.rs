use crate::models::ChatTurn;

/// Prepends prior turns (oldest first) to the current query.
pub fn build_contextual_query(history: &[ChatTurn], query: &str) -> String {
    let query = query.trim();
    if history.is_empty() {
        return query.to_string();
    }

    let mut prompt = String::from("Previous conversation:\n");
    for turn in history {
        prompt.push_str("User: ");
        prompt.push_str(turn.user_message.trim());
        prompt.push('\n');
        if let Some(reply) = turn.ai_message.as_deref().filter(|reply| !reply.trim().is_empty()) {
            prompt.push_str("Assistant: ");
            prompt.push_str(reply.trim());
            prompt.push('\n');
        }
    }
    prompt.push_str("\nCurrent request: ");
    prompt.push_str(query);
    prompt
}
