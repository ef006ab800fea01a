//! Prompts and model-output parsing for questions and grades

use serde_json::Value;

use crate::domain::tutoring::clamp_score;
use crate::providers::ChatMessage;

/// Retrieval query used to sample a book's main themes
pub const OVERVIEW_QUERY: &str = "overview key concepts from the book";
/// Chunks retrieved as question-generation context
pub const QUESTION_CONTEXT_CHUNKS: usize = 8;
/// Nearest chunks considered before the diversity rerank
pub const QUESTION_CANDIDATE_CHUNKS: usize = {
    let doubled = QUESTION_CONTEXT_CHUNKS * 2;
    if doubled > 16 { doubled } else { 16 }
};
/// Relevance weight in the diversity rerank
pub const QUESTION_DIVERSITY_LAMBDA: f32 = 0.5;
/// Chunks retrieved per answer when grading
pub const GRADING_CONTEXT_CHUNKS: usize = 6;

pub fn question_prompt(n: usize, context: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::system(format!(
        "You are a helpful tutor. Generate {n} diverse, open-ended study questions \
         based only on the provided book context.\n\
         Vary difficulty from easy to hard. Output as a numbered list.\n\
         Context:\n---\n{context}\n---"
    ))]
}

pub fn ideal_answer_prompt(question: &str, context: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::system(format!(
        "Using ONLY the provided context, write a concise, high-quality ideal answer \
         to the question.\n\
         If the context is insufficient, say so and answer partially.\n\
         Context:\n---\n{context}\n---\n\
         Question: {question}\n\
         Return only the answer text."
    ))]
}

pub fn grading_prompt(question: &str, answer: &str, context: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "You are a strict but fair grader. Use ONLY the provided context to evaluate \
             the student's answer.\n\
             Return ONE JSON object with exactly these keys:\n\
             - score: integer in [1,10]\n\
             - reasoning: string (1-3 sentences)\n\
             No markdown, no code fences, no extra text.",
        ),
        ChatMessage::user(format!(
            "Question: {question}\n\
             Student answer: {answer}\n\
             Reference context:\n{context}\n\
             Return JSON now."
        )),
    ]
}

/// Non-empty trimmed lines of a numbered list, at most `n`
pub fn parse_questions(raw: &str, n: usize) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(n)
        .map(String::from)
        .collect()
}

/// Score and reasoning pulled out of a grader reply
#[derive(Debug, Clone, PartialEq)]
pub struct Grade {
    pub score: Option<u8>,
    pub reasoning: String,
}

fn strip_code_fences(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```") {
        s = rest;
        if s.get(..4).is_some_and(|tag| tag.eq_ignore_ascii_case("json")) {
            s = &s[4..];
        }
    }
    s.trim().trim_end_matches("```").trim()
}

/// Parse a grader reply.
///
/// Fences are stripped and the outermost `{...}` is parsed. When that fails
/// the score is unknown and the cleaned reply becomes the reasoning. A
/// missing score counts as 0 before clamping, a non-numeric one as unknown.
pub fn parse_grade(raw: &str) -> Grade {
    let mut s = strip_code_fences(raw);
    if let (Some(start), Some(end)) = (s.find('{'), s.rfind('}')) {
        if start < end {
            s = &s[start..=end];
        }
    }

    let object = match serde_json::from_str::<Value>(s) {
        Ok(Value::Object(map)) => map,
        _ => {
            return Grade {
                score: None,
                reasoning: s.to_string(),
            }
        }
    };

    let score = match object.get("score") {
        None => clamp_score(0.0),
        Some(Value::Number(n)) => n.as_f64().and_then(clamp_score),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok().and_then(clamp_score),
        Some(_) => None,
    };

    let reasoning = match object.get("reasoning") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    Grade { score, reasoning }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_questions_keeps_non_empty_lines() {
        let raw = "1. What is osmosis?\n\n2. Define diffusion.\n   \n3. Compare both.\n4. Extra";
        assert_eq!(
            parse_questions(raw, 3),
            vec!["1. What is osmosis?", "2. Define diffusion.", "3. Compare both."]
        );
    }

    #[test]
    fn test_grade_from_plain_json() {
        let grade = parse_grade(r#"{"score": 7, "reasoning": "Mostly right."}"#);
        assert_eq!(grade, Grade { score: Some(7), reasoning: "Mostly right.".into() });
    }

    #[test]
    fn test_grade_from_fenced_json_with_chatter() {
        let raw = "```json\nHere you go: {\"score\": 8.6, \"reasoning\": \"Good\"} thanks\n```";
        let grade = parse_grade(raw);
        assert_eq!(grade.score, Some(9));
        assert_eq!(grade.reasoning, "Good");
    }

    #[test]
    fn test_grade_score_is_clamped() {
        assert_eq!(parse_grade(r#"{"score": 42}"#).score, Some(10));
        assert_eq!(parse_grade(r#"{"score": -3, "reasoning": "x"}"#).score, Some(1));
        assert_eq!(parse_grade(r#"{"score": "6"}"#).score, Some(6));
    }

    #[test]
    fn test_unparseable_grade_keeps_raw_text() {
        let grade = parse_grade("I would give this a seven.");
        assert_eq!(grade.score, None);
        assert_eq!(grade.reasoning, "I would give this a seven.");
    }

    #[test]
    fn test_non_numeric_score_is_unknown() {
        let grade = parse_grade(r#"{"score": "seven", "reasoning": "ok"}"#);
        assert_eq!(grade.score, None);
        assert_eq!(grade.reasoning, "ok");
    }

    #[test]
    fn test_prompts_embed_context() {
        let messages = grading_prompt("Q?", "A.", "CTX");
        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.contains("Student answer: A."));
        assert!(question_prompt(4, "CTX")[0].content.contains("Generate 4 diverse"));
    }
}
