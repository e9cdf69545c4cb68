//! End-to-end pattern scenarios exercising the tokenizer, parser, and
//! matcher together.

use harbor_regex::{Error, Regex};

fn matches(pattern: &str, input: &str) -> bool {
    Regex::new(pattern).unwrap().is_match(input.as_bytes())
}

#[test]
fn digits_then_literal_tail() {
    assert!(matches(r"\d\d\d apple", "100 apples"));
    assert!(!matches(r"\d\d\d apple", "10 apples"));
}

#[test]
fn greedy_plus_gives_back_for_the_tail() {
    assert!(matches("ca+ats", "caaats"));
    assert!(!matches("ca+ats", "cats"));
}

#[test]
fn backreference_repeats_the_captured_word() {
    assert!(matches(r"(\w+) and \1", "cat and cat"));
    assert!(!matches(r"(\w+) and \1", "cat and dog"));
}

#[test]
fn two_groups_and_two_backreferences() {
    assert!(matches(r"(\d+) (\w+) and \1 \2", "3 red and 3 red"));
    assert!(!matches(r"(\d+) (\w+) and \1 \2", "3 red and 4 red"));
    assert!(!matches(r"(\d+) (\w+) and \1 \2", "3 red and 3 blue"));
}

// A pattern of plain literals behaves exactly like substring search.
#[test]
fn literal_law() {
    let haystacks: [&str; 4] = ["needle", "a needle in", "needl", ""];
    for haystack in haystacks {
        assert_eq!(
            matches("needle", haystack),
            haystack.contains("needle"),
            "haystack: {haystack:?}"
        );
    }
}

// "^p" matches exactly where p matches at offset zero or after a newline.
#[test]
fn anchor_law() {
    assert_eq!(matches("^log", "log line"), true);
    assert_eq!(matches("^log", "a log line"), false);
    assert_eq!(matches("^log", "line\nlog"), true);
    assert_eq!(matches("end$", "the end"), true);
    assert_eq!(matches("end$", "the end."), false);
    assert_eq!(matches("end$", "the end\nmore"), true);
}

// Quantifier bounds: the match consumes between min and max repetitions.
#[test]
fn quantifier_bounds_law() {
    // a? then $: zero or one 'a'.
    assert!(matches("^ba?$", "b"));
    assert!(matches("^ba?$", "ba"));
    assert!(!matches("^ba?$", "baa"));
    // a+ requires at least one.
    assert!(!matches("^ba+$", "b"));
    assert!(matches("^ba+$", "baaaa"));
    // a* accepts any count including zero.
    assert!(matches("^ba*$", "b"));
    assert!(matches("^ba*$", "baaaaaa"));
}

// Whatever group k captured is byte-for-byte what \k consumed.
#[test]
fn backreference_equality_law() {
    let regex = Regex::new(r"(\w+)-\1").unwrap();
    let input = b"prefix abc-abc suffix";
    let captures = regex.captures(input).unwrap();
    assert_eq!(captures[0], Some(&b"abc"[..]));
    assert!(!regex.is_match(b"abc-abd"));
}

#[test]
fn quantified_group_with_backreference() {
    assert!(matches(r"(\d+)x\1", "12x12"));
    assert!(!matches(r"(\d+)x\1", "12x13"));
}

#[test]
fn classes_mix_ranges_shorthands_and_negation() {
    assert!(matches(r"[a-f0-9]+", "deadbeef"));
    assert!(matches(r"[^ ]+", "word"));
    assert!(!matches(r"^[^ ]+$", "two words"));
    assert!(matches(r"[\w.]+@[\w.]+", "user.name@example.com"));
}

#[test]
fn alternation_inside_group() {
    assert!(matches("(cat|dog) food", "dog food"));
    assert!(matches("(cat|dog) food", "cat food"));
    assert!(!matches("(cat|dog) food", "bird food"));
}

#[test]
fn escaped_metacharacters_match_themselves() {
    assert!(matches(r"3\.14", "pi is 3.14"));
    assert!(!matches(r"3\.14", "pi is 3514"));
    assert!(matches(r"a\*b", "a*b"));
}

#[test]
fn compile_errors_surface_to_the_caller() {
    assert_eq!(Regex::new("ab\\").unwrap_err(), Error::InvalidEscapeSequence);
    assert_eq!(Regex::new("[ab").unwrap_err(), Error::UnclosedCharacterClass);
    assert_eq!(Regex::new("(ab").unwrap_err(), Error::UnclosedParenthesis);
    assert_eq!(Regex::new("ab)").unwrap_err(), Error::UnexpectedCloseParen);
    assert_eq!(Regex::new(r"\z").unwrap_err(), Error::UnsupportedEscape(b'z'));
    assert_eq!(Regex::new("a**").unwrap_err(), Error::UnsupportedToken);
}

#[test]
fn compiled_pattern_is_reusable_across_inputs() {
    let regex = Regex::new(r"^\d+$").unwrap();
    assert!(regex.is_match(b"123"));
    assert!(!regex.is_match(b"12a"));
    assert!(regex.is_match(b"7"));
}

#[test]
fn matching_works_on_arbitrary_bytes() {
    let regex = Regex::from_bytes(b"\x00+end").unwrap();
    assert!(regex.is_match(b"\x00\x00end"));
    assert!(!regex.is_match(b"end"));
}
