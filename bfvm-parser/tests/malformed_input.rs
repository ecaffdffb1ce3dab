//! Malformed-input handling for both frontends

use bfvm_parser::{parse_brainfuck, parse_text, ParseError};

#[test]
fn test_deeply_nested_unbalanced() {
    let mut source = vec![b'['; 64];
    source.extend_from_slice(&[b']'; 63]);
    assert!(matches!(
        parse_brainfuck(&source),
        Err(ParseError::UnclosedLoop { .. })
    ));
}

#[test]
fn test_close_before_open() {
    let err = parse_brainfuck(b"+-]<>[").unwrap_err();
    assert_eq!(err, ParseError::UnexpectedLoopEnd { position: 2 });
}

#[test]
fn test_error_position_ignores_commentary() {
    // Commentary bytes still count toward the reported position.
    let err = parse_brainfuck(b"hello ]").unwrap_err();
    assert_eq!(err, ParseError::UnexpectedLoopEnd { position: 6 });
}

#[test]
fn test_deep_nesting_balanced_is_fine() {
    let mut source = vec![b'['; 256];
    source.extend_from_slice(&[b']'; 256]);
    assert!(parse_brainfuck(&source).is_ok());
}

#[test]
fn test_text_unknown_names() {
    for source in ["nop", "Set 1", "OUT", "add1"] {
        assert!(
            matches!(
                parse_text(source),
                Err(ParseError::UnknownInstruction { line: 1, .. })
            ),
            "accepted {:?}",
            source
        );
    }
}

#[test]
fn test_text_error_reports_correct_line() {
    let source = "halt\n\n# fine so far\nbogus 1\n";
    assert!(matches!(
        parse_text(source),
        Err(ParseError::UnknownInstruction { line: 4, .. })
    ));
}

#[test]
fn test_text_integer_garbage() {
    for source in ["add", "add ,", "add 12three", "set 0x", "move , 99999999999"] {
        let err = parse_text(source).unwrap_err();
        assert!(
            matches!(
                err,
                ParseError::MalformedInteger { .. } | ParseError::BadOperands { .. }
            ),
            "accepted {:?}: {:?}",
            source,
            err
        );
    }
}

#[test]
fn test_text_stray_arguments() {
    for source in [
        "halt 0",
        "breakpoint @ 1",
        "loop_start 1",
        "in 5",
        "out 5",
        "out_value 1 @ 2",
        "move 3",
    ] {
        assert!(
            matches!(parse_text(source), Err(ParseError::BadOperands { .. })),
            "accepted {:?}",
            source
        );
    }
}

#[test]
fn test_text_unbalanced_loops_report_lines() {
    assert_eq!(
        parse_text("add 1\nloop_end").unwrap_err(),
        ParseError::UnmatchedLoopEnd { line: 2 }
    );
    assert_eq!(
        parse_text("loop_start\nloop_start\nadd 1\nloop_end").unwrap_err(),
        ParseError::UnclosedLoopStart { line: 1 }
    );
}
