use crew::interp::Grammar;
use crew::util::tokenize;

fn sample() -> Grammar {
    let mut grammar = Grammar::default();
    grammar.add_param("string", |token: &str| !token.is_empty());
    grammar.add_command("print1", &["string"]);
    grammar
}

#[test]
fn empty_input_parses_to_none() {
    let grammar = sample();
    assert!(grammar.parse(&[]).is_none());
    assert!(grammar.parse(&tokenize("")).is_none());
}

#[test]
#[should_panic(expected = "invalid param id")]
fn unknown_param_name_fails_at_registration() {
    let mut grammar = Grammar::default();
    grammar.add_command("broken", &["no-such-type"]);
}

#[test]
fn unknown_command_still_carries_arguments() {
    let grammar = sample();
    let result = grammar.parse(&tokenize("foo bar")).unwrap();
    assert!(result.command().is_none());
    assert_eq!(result.name(), "foo");
    assert_eq!(result.num_args(), 1);
    assert_eq!(result.args(), ["bar"]);
    assert_eq!(result.to_string(), "[foo]? [bar]?");
}

#[test]
fn valid_argument_is_annotated() {
    let grammar = sample();
    let result = grammar.parse(&tokenize("print1 hi")).unwrap();
    assert_eq!(result.num_args(), 1);
    assert_eq!(result.arg_valid(0), Some(true));
    assert_eq!(result.to_string(), "[print1]CMD [hi]string<Valid>");
}

#[test]
fn missing_argument_renders_as_a_hole() {
    let grammar = sample();
    let result = grammar.parse(&tokenize("print1")).unwrap();
    assert_eq!(result.num_args(), 1);
    assert_eq!(result.arg_valid(0), None);
    assert_eq!(result.to_string(), "[print1]CMD (?):string");
}

#[test]
fn extra_arguments_count_toward_num_args() {
    let grammar = sample();
    let result = grammar.parse(&tokenize("print1 a b")).unwrap();
    assert_eq!(result.num_args(), 2);
    assert_eq!(result.to_string(), "[print1]CMD [a]string<Valid> [b]?");
}

#[test]
fn replacing_a_param_changes_validation_in_place() {
    let mut grammar = sample();
    let line = tokenize("print1 hi");
    assert_eq!(
        grammar.parse(&line).unwrap().to_string(),
        "[print1]CMD [hi]string<Valid>"
    );
    grammar.add_param("string", |token: &str| token.len() > 5);
    assert_eq!(
        grammar.parse(&line).unwrap().to_string(),
        "[print1]CMD [hi]string<Invalid>"
    );
}

#[test]
fn first_command_registration_wins() {
    let mut grammar = Grammar::default();
    grammar.add_param("string", |token: &str| !token.is_empty());
    grammar.add_param("number", |token: &str| {
        token.chars().all(|c| c.is_ascii_digit())
    });
    let first = grammar.add_command("go", &["string"]);
    let second = grammar.add_command("go", &["number", "number"]);
    assert_eq!(first, second);
    assert_eq!(
        grammar.parse(&tokenize("go hi")).unwrap().to_string(),
        "[go]CMD [hi]string<Valid>"
    );
}

#[test]
fn an_empty_name_token_is_no_command() {
    let grammar = sample();
    // a leading separator makes the first token empty
    let result = grammar.parse(&tokenize(" x")).unwrap();
    assert_eq!(result.to_string(), "No command");
}

#[test]
fn tokenize_keeps_interior_empties_and_drops_one_trailing() {
    assert_eq!(tokenize("a b"), ["a", "b"]);
    assert_eq!(tokenize("a  b"), ["a", "", "b"]);
    assert_eq!(tokenize("a b "), ["a", "b"]);
    assert_eq!(tokenize("a  "), ["a", ""]);
    assert_eq!(tokenize(" "), [""]);
    assert!(tokenize("").is_empty());
}
