use std::fs::File;
use std::io::Write;
use std::os::fd::{AsRawFd, OwnedFd};

use crew::terminal::{ctrl_key, parse_cursor_report, read_key, Key};

/// Preload a pipe with raw input and close the write end, so complete
/// sequences decode normally and truncated ones hit end-of-input.
fn feed(bytes: &[u8]) -> OwnedFd {
    let (read_end, write_end) = nix::unistd::pipe().expect("pipe");
    let mut writer = File::from(write_end);
    writer.write_all(bytes).expect("preload input");
    read_end
}

#[test]
fn arrow_keys_decode() {
    let fd = feed(b"\x1b[A\x1b[B\x1b[C\x1b[D");
    for want in [Key::ArrowUp, Key::ArrowDown, Key::ArrowRight, Key::ArrowLeft] {
        assert_eq!(read_key(fd.as_raw_fd()).unwrap(), want);
    }
}

#[test]
fn tilde_sequences_decode() {
    let fd = feed(b"\x1b[1~\x1b[3~\x1b[4~\x1b[5~\x1b[6~\x1b[7~\x1b[8~");
    let want = [
        Key::Home,
        Key::Delete,
        Key::End,
        Key::PageUp,
        Key::PageDown,
        Key::Home,
        Key::End,
    ];
    for key in want {
        assert_eq!(read_key(fd.as_raw_fd()).unwrap(), key);
    }
}

#[test]
fn home_and_end_variants_decode() {
    let fd = feed(b"\x1b[H\x1b[F\x1bOH\x1bOF");
    for want in [Key::Home, Key::End, Key::Home, Key::End] {
        assert_eq!(read_key(fd.as_raw_fd()).unwrap(), want);
    }
}

#[test]
fn plain_bytes_pass_through() {
    let fd = feed(b"a\x7f\r\x11");
    assert_eq!(read_key(fd.as_raw_fd()).unwrap(), Key::Byte(b'a'));
    assert_eq!(read_key(fd.as_raw_fd()).unwrap(), Key::Backspace);
    assert_eq!(read_key(fd.as_raw_fd()).unwrap(), Key::Byte(b'\r'));
    assert_eq!(read_key(fd.as_raw_fd()).unwrap(), Key::Byte(ctrl_key(b'q')));
}

#[test]
fn unknown_or_truncated_sequences_fall_back_to_escape() {
    let cases: [&[u8]; 5] = [b"\x1b", b"\x1b[", b"\x1b[2~", b"\x1b[9~", b"\x1bX!"];
    for bytes in cases {
        let fd = feed(bytes);
        assert_eq!(read_key(fd.as_raw_fd()).unwrap(), Key::Escape, "{bytes:?}");
    }
}

#[test]
fn key_codes_form_the_stable_contract() {
    assert_eq!(Key::Backspace.code(), 127);
    assert_eq!(Key::Escape.code(), 27);
    let block = [
        Key::ArrowLeft,
        Key::ArrowRight,
        Key::ArrowUp,
        Key::ArrowDown,
        Key::Delete,
        Key::Home,
        Key::End,
        Key::PageUp,
        Key::PageDown,
    ];
    for (offset, key) in block.into_iter().enumerate() {
        assert_eq!(key.code(), 1000 + offset as u32);
        assert_eq!(Key::from_code(key.code()), Some(key));
    }
    assert_eq!(Key::Byte(b'q').code(), u32::from(b'q'));
    assert_eq!(Key::from_code(65), Some(Key::Byte(b'A')));
    assert_eq!(Key::from_code(127), Some(Key::Backspace));
    assert_eq!(Key::from_code(27), Some(Key::Escape));
    assert_eq!(Key::from_code(999), None);
    assert_eq!(Key::from_code(1009), None);
}

#[test]
fn ctrl_chords_mask_to_control_bytes() {
    assert_eq!(ctrl_key(b'q'), 0x11);
    assert_eq!(ctrl_key(b'a'), 0x01);
}

#[test]
fn cursor_reports_parse() {
    assert_eq!(parse_cursor_report(b"\x1b[24;80"), Some((24, 80)));
    assert_eq!(parse_cursor_report(b"\x1b[1;1"), Some((1, 1)));
    assert_eq!(parse_cursor_report(b"24;80"), None);
    assert_eq!(parse_cursor_report(b"\x1b[garbage"), None);
    assert_eq!(parse_cursor_report(b"\x1b[12"), None);
    assert_eq!(parse_cursor_report(b""), None);
}
