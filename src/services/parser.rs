// src/services/parser.rs

use std::{fmt, sync::LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::{
    error::AppError,
    models::quiz::{Answer, Question, Quiz},
    utils::hash::sha1_hex,
};

/// Answer lists longer than this are cut, matching what existing quiz files expect.
pub const MAX_ANSWERS_PER_QUESTION: usize = 10;

/// Line that separates two question blocks.
const QUESTION_SEPARATOR: &str = "---";

/// Length of the `- [x] ` prefix of an answer line.
const CHECKBOX_PREFIX_LEN: usize = 6;

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^# (?P<name>.+) \(duration: (?P<duration>[0-9]+)min\)\s*$")
        .expect("header regex is valid")
});

static ANSWER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^- \[(?P<mark>[ xX])\] .*$").expect("answer regex is valid"));

static CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?P<lang>[^\s`]*)[^\n]*\n(?P<code>.*?)```").expect("code regex is valid")
});

/// Why a single source file could not be read as a quiz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The first line is not `# <name> (duration: <N>min)`.
    MalformedHeader { filename: String },
    /// The duration is zero or too large to be counted in seconds.
    InvalidDuration { filename: String, minutes: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MalformedHeader { filename } => write!(
                f,
                "{}: the first line must be '# <name> (duration: <N>min)'",
                filename
            ),
            ParseError::InvalidDuration { filename, minutes } => {
                write!(f, "{}: invalid duration '{}min'", filename, minutes)
            }
        }
    }
}

impl std::error::Error for ParseError {}

impl From<ParseError> for AppError {
    fn from(err: ParseError) -> Self {
        AppError::InvalidArgument(err.to_string())
    }
}

/// A quiz freshly read from source, before it is given a version.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuiz {
    pub sha1: String,
    pub filename: String,
    pub name: String,
    /// Seconds.
    pub duration: i32,
    pub questions: Vec<Question>,
}

impl ParsedQuiz {
    /// Turns the parsed content into the stored representation of one version.
    pub fn into_quiz(self, version: i32, created_at: DateTime<Utc>) -> Quiz {
        Quiz {
            sha1: self.sha1,
            filename: self.filename,
            name: self.name,
            duration: self.duration,
            version,
            active: true,
            created_at,
            questions: self.questions,
        }
    }
}

/// Parses the raw text of one quiz file.
///
/// Only the header can fail: everything after it is read leniently.
pub fn parse(filename: &str, raw: &str) -> Result<ParsedQuiz, ParseError> {
    let (header, body) = raw.split_once('\n').unwrap_or((raw, ""));
    let (name, duration) = parse_header(filename, header.trim_end_matches('\r'))?;

    let questions = split_blocks(body)
        .into_iter()
        .filter(|block| !block.trim().is_empty())
        .zip(1..)
        .map(|(block, position)| parse_question(filename, block, position))
        .collect();

    Ok(ParsedQuiz {
        sha1: sha1_hex(raw),
        filename: filename.to_string(),
        name,
        duration,
        questions,
    })
}

fn parse_header(filename: &str, header: &str) -> Result<(String, i32), ParseError> {
    let caps = HEADER_RE
        .captures(header)
        .ok_or_else(|| ParseError::MalformedHeader {
            filename: filename.to_string(),
        })?;

    let minutes = &caps["duration"];
    let duration = minutes
        .parse::<i32>()
        .ok()
        .filter(|m| *m > 0)
        .and_then(|m| m.checked_mul(60))
        .ok_or_else(|| ParseError::InvalidDuration {
            filename: filename.to_string(),
            minutes: minutes.to_string(),
        })?;

    Ok((caps["name"].trim().to_string(), duration))
}

/// Splits on lines that are exactly `---`, keeping each block's text verbatim.
fn split_blocks(body: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut block_start = 0;
    let mut offset = 0;

    for line in body.split_inclusive('\n') {
        let line_end = offset + line.len();
        if line.trim_end_matches(['\n', '\r']) == QUESTION_SEPARATOR {
            blocks.push(&body[block_start..offset]);
            block_start = line_end;
        }
        offset = line_end;
    }
    blocks.push(&body[block_start..]);

    blocks
}

fn parse_question(filename: &str, block: &str, position: i32) -> Question {
    let lines: Vec<&str> = block.lines().collect();

    // The answer list is the trailing run of checkbox lines, ignoring blank lines after it.
    let mut end = lines.len();
    while end > 0 && lines[end - 1].trim().is_empty() {
        end -= 1;
    }
    let mut start = end;
    while start > 0 && ANSWER_RE.is_match(lines[start - 1]) {
        start -= 1;
    }

    let mut answer_lines = &lines[start..end];
    if answer_lines.len() > MAX_ANSWERS_PER_QUESTION {
        tracing::warn!(
            "{}: question {} has {} answers, keeping the first {}",
            filename,
            position,
            answer_lines.len(),
            MAX_ANSWERS_PER_QUESTION
        );
        answer_lines = &answer_lines[..MAX_ANSWERS_PER_QUESTION];
    }

    let (content, code, code_language) = extract_code(&lines[..start].join("\n"));

    Question {
        sha1: sha1_hex(block),
        position,
        content,
        code,
        code_language,
        answers: answer_lines.iter().map(|line| parse_answer(line)).collect(),
    }
}

fn parse_answer(line: &str) -> Answer {
    let valid = matches!(line.as_bytes().get(3), Some(b'x' | b'X'));
    Answer {
        sha1: sha1_hex(line),
        content: line[CHECKBOX_PREFIX_LEN..].trim().to_string(),
        valid,
    }
}

/// Pulls the first fenced code block out of the question text.
/// Without a fence the text is only trimmed.
fn extract_code(text: &str) -> (String, Option<String>, Option<String>) {
    let Some(caps) = CODE_RE.captures(text) else {
        return (text.trim().to_string(), None, None);
    };

    let fence = caps.get(0).map_or(0..0, |m| m.range());
    let code = caps["code"].trim_end().trim_start_matches(['\n', '\r']).to_string();
    let language = Some(caps["lang"].to_string()).filter(|l| !l.is_empty());

    let mut content = String::with_capacity(text.len());
    content.push_str(&text[..fence.start]);
    content.push_str(&text[fence.end..]);

    (content.trim().to_string(), Some(code), language)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# Sample (duration: 1min)\nQ1?\n- [x] Yes\n- [ ] No\n";

    const VCS: &str = "# Version Control System (duration: 15min)
What does VCS stand for ?
- [x] Version Control System
- [ ] Video CassetteSs
- [ ] Very Cool Stuff
---
Which ones are VCS ?

- [X] git
- [ ] docker
- [x] mercurial
---
Question with a `command` ?
```shell
command1
command2
```
- [ ] a
- [x] b
";

    #[test]
    fn test_parse_sample() {
        let quiz = parse("sample.quiz.md", SAMPLE).unwrap();

        assert_eq!(quiz.name, "Sample");
        assert_eq!(quiz.filename, "sample.quiz.md");
        assert_eq!(quiz.duration, 60);
        assert_eq!(quiz.sha1, sha1_hex(SAMPLE));
        assert_eq!(quiz.questions.len(), 1);

        let question = &quiz.questions[0];
        assert_eq!(question.position, 1);
        assert_eq!(question.content, "Q1?");
        assert_eq!(question.sha1, sha1_hex("Q1?\n- [x] Yes\n- [ ] No\n"));
        assert_eq!(question.answers.len(), 2);
        assert_eq!(question.answers[0].content, "Yes");
        assert!(question.answers[0].valid);
        assert_eq!(question.answers[0].sha1, sha1_hex("- [x] Yes"));
        assert_eq!(question.answers[1].content, "No");
        assert!(!question.answers[1].valid);
    }

    #[test]
    fn test_parse_multiple_questions_in_order() {
        let quiz = parse("vcs.quiz.md", VCS).unwrap();

        assert_eq!(quiz.name, "Version Control System");
        assert_eq!(quiz.duration, 15 * 60);
        assert_eq!(quiz.questions.len(), 3);
        assert_eq!(
            quiz.questions.iter().map(|q| q.position).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        let second = &quiz.questions[1];
        assert_eq!(second.content, "Which ones are VCS ?");
        assert_eq!(
            second.answers.iter().map(|a| a.valid).collect::<Vec<_>>(),
            vec![true, false, true]
        );
    }

    #[test]
    fn test_code_block_is_extracted() {
        let quiz = parse("vcs.quiz.md", VCS).unwrap();
        let third = &quiz.questions[2];

        assert_eq!(third.content, "Question with a `command` ?");
        assert_eq!(third.code.as_deref(), Some("command1\ncommand2"));
        assert_eq!(third.code_language.as_deref(), Some("shell"));
        assert_eq!(third.answers.len(), 2);
    }

    #[test]
    fn test_code_block_without_language() {
        let raw = "# Q (duration: 2min)\nRun this:\n```\nls -la\n```\n- [x] ok\n";
        let question = &parse("q.quiz.md", raw).unwrap().questions[0];

        assert_eq!(question.content, "Run this:");
        assert_eq!(question.code.as_deref(), Some("ls -la"));
        assert_eq!(question.code_language, None);
    }

    #[test]
    fn test_unclosed_fence_leaves_text_unchanged() {
        let raw = "# Q (duration: 2min)\nRun this:\n```shell\nls\n- [x] ok\n";
        let question = &parse("q.quiz.md", raw).unwrap().questions[0];

        assert_eq!(question.content, "Run this:\n```shell\nls");
        assert_eq!(question.code, None);
    }

    #[test]
    fn test_hashing_is_idempotent() {
        let first = parse("vcs.quiz.md", VCS).unwrap();
        let second = parse("vcs.quiz.md", VCS).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_shared_question_has_same_hash_across_quizzes() {
        let a = parse("a.quiz.md", "# A (duration: 1min)\nQ1?\n- [x] Yes\n- [ ] No\n").unwrap();
        let b = parse("b.quiz.md", "# B (duration: 5min)\nQ1?\n- [x] Yes\n- [ ] No\n").unwrap();

        assert_ne!(a.sha1, b.sha1);
        assert_eq!(a.questions[0].sha1, b.questions[0].sha1);
    }

    #[test]
    fn test_zero_questions() {
        let quiz = parse("empty.quiz.md", "# Empty (duration: 3min)\n").unwrap();
        assert!(quiz.questions.is_empty());

        let quiz = parse("empty.quiz.md", "# Empty (duration: 3min)").unwrap();
        assert!(quiz.questions.is_empty());
    }

    #[test]
    fn test_trailing_separator_does_not_create_a_question() {
        let raw = "# S (duration: 1min)\nQ1?\n- [x] a\n---\n";
        assert_eq!(parse("s.quiz.md", raw).unwrap().questions.len(), 1);
    }

    #[test]
    fn test_separator_must_be_a_whole_line() {
        let raw = "# S (duration: 1min)\nIs a --- b a separator?\n----\n- [ ] no\n";
        let quiz = parse("s.quiz.md", raw).unwrap();
        assert_eq!(quiz.questions.len(), 1);
        assert_eq!(quiz.questions[0].content, "Is a --- b a separator?\n----");
    }

    #[test]
    fn test_answers_are_truncated_to_ten() {
        let mut raw = String::from("# Many (duration: 1min)\nPick one\n");
        for i in 0..12 {
            raw.push_str(&format!("- [ ] option {}\n", i));
        }

        let question = &parse("many.quiz.md", &raw).unwrap().questions[0];
        assert_eq!(question.answers.len(), MAX_ANSWERS_PER_QUESTION);
        assert_eq!(question.answers[9].content, "option 9");
    }

    #[test]
    fn test_only_trailing_checkboxes_are_answers() {
        let raw = "# S (duration: 1min)\nConsider:\n- [x] not an answer\nThen pick:\n- [ ] a\n- [X] b\n\n";
        let question = &parse("s.quiz.md", raw).unwrap().questions[0];

        assert_eq!(question.content, "Consider:\n- [x] not an answer\nThen pick:");
        assert_eq!(question.answers.len(), 2);
        assert!(question.answers[1].valid);
    }

    #[test]
    fn test_malformed_header() {
        let err = parse("bad.quiz.md", "# Marvel Universe\nQ?\n- [x] a\n").unwrap_err();
        assert_eq!(
            err,
            ParseError::MalformedHeader {
                filename: "bad.quiz.md".to_string()
            }
        );

        assert!(parse("bad.quiz.md", "").is_err());
        assert!(parse("bad.quiz.md", "Title (duration: 1min)\n").is_err());
    }

    #[test]
    fn test_zero_duration_is_rejected() {
        let err = parse("zero.quiz.md", "# Zero (duration: 0min)\n").unwrap_err();
        assert!(matches!(err, ParseError::InvalidDuration { .. }));
    }

    #[test]
    fn test_parse_error_becomes_invalid_argument() {
        let err: AppError = parse("bad.quiz.md", "nope").unwrap_err().into();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }
}
