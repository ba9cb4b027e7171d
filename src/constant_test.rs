use crate::constant::{HandshakeOptions, Language, SUPPORTED_DIGEST_ALGORITHMS};

#[test]
fn sql_templates_match_spec() {
    let t = Language::Sql.templates();
    assert_eq!(t.prefix, "s");
    assert_eq!(t.suffix, "\n;");
}

#[test]
fn mal_templates_differ_from_sql() {
    let t = Language::Mal.templates();
    assert_eq!(t.prefix, "");
    assert_eq!(t.suffix, ";\n");
}

#[test]
fn language_from_str_roundtrip() {
    assert!(matches!("sql".parse::<Language>(), Ok(Language::Sql)));
    assert!(matches!("mal".parse::<Language>(), Ok(Language::Mal)));
    assert!("monet".parse::<Language>().is_err());
}

#[test]
fn handshake_options_are_distinct_bits() {
    let all = HandshakeOptions::AUTOCOMMIT
        | HandshakeOptions::REPLY_SIZE
        | HandshakeOptions::SIZE_HEADER
        | HandshakeOptions::TIME_ZONE;
    assert_eq!(all.bits().count_ones(), 4);
}

#[test]
fn digest_algorithms_ranked_strongest_first() {
    assert_eq!(SUPPORTED_DIGEST_ALGORITHMS[0], "SHA512");
    assert_eq!(*SUPPORTED_DIGEST_ALGORITHMS.last().unwrap(), "MD5");
}
