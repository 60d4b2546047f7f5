//! RFC 5322 address lexer and grammar (From, To, Cc, Sender, ...).
//!
//! Parsing happens in two steps. [`tokenize_address_field`] turns the header
//! value into words and specials, dropping comments and whitespace. The
//! recursive-descent parser then builds mailboxes and groups from the tokens.
//! Display names are RFC 2047-decoded only after parsing, so an encoded comma
//! cannot split a list entry.

use std::borrow::Cow;
use std::iter::Peekable;
use std::str::CharIndices;

use crate::error::{EmlError, Result};
use crate::model::address::{Address, Group, Mailbox};
use crate::parser::encoded_word::decode_or_raw;

/// One lexical element of an address header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Run of atext characters (non-ASCII included).
    Atom(String),
    /// Content of a quoted string, escapes resolved.
    Quoted(String),
    /// Content of a `[...]` domain literal, without brackets.
    DomainLiteral(String),
    /// One of `< > @ , ; : .`
    Special(char),
}

const SPECIALS: &[char] = &['<', '>', '@', ',', ';', ':', '.'];

/// Split an address header value into tokens.
///
/// Fails with [`EmlError::AddressLex`] on unterminated quoted strings,
/// comments or domain literals, stray `)`, `]` or `\`, and control characters.
pub fn tokenize_address_field(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {}
            '(' => {
                if !skip_comment(&mut chars) {
                    return Err(lex_error(offset, "unterminated comment"));
                }
            }
            '"' => {
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some((_, '\\')) => match chars.next() {
                            Some((_, escaped)) => text.push(escaped),
                            None => return Err(lex_error(offset, "unterminated quoted string")),
                        },
                        Some((_, '"')) => break,
                        Some((_, '\r' | '\n')) => {}
                        Some((_, ch)) => text.push(ch),
                        None => return Err(lex_error(offset, "unterminated quoted string")),
                    }
                }
                tokens.push(Token::Quoted(text));
            }
            '[' => {
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some((_, '\\')) => {
                            if let Some((_, escaped)) = chars.next() {
                                text.push(escaped);
                            }
                        }
                        Some((_, ']')) => break,
                        Some((_, ch)) if !ch.is_whitespace() => text.push(ch),
                        Some(_) => {}
                        None => return Err(lex_error(offset, "unterminated domain literal")),
                    }
                }
                tokens.push(Token::DomainLiteral(text));
            }
            ')' => return Err(lex_error(offset, "unbalanced ')'")),
            ']' => return Err(lex_error(offset, "unbalanced ']'")),
            '\\' => return Err(lex_error(offset, "stray '\\'")),
            c if SPECIALS.contains(&c) => tokens.push(Token::Special(c)),
            c if c.is_control() => {
                return Err(lex_error(offset, &format!("control character {:?}", c)))
            }
            c => {
                let mut atom = String::from(c);
                while let Some((_, next)) = chars.next_if(|(_, n)| is_atext(*n)) {
                    atom.push(next);
                }
                tokens.push(Token::Atom(atom));
            }
        }
    }
    Ok(tokens)
}

type Chars<'s> = Peekable<CharIndices<'s>>;

/// Consume a (possibly nested) comment whose `(` was already read.
/// Returns `false` when the input ends inside it.
fn skip_comment(chars: &mut Chars<'_>) -> bool {
    let mut depth = 1;
    while depth > 0 {
        match chars.next() {
            Some((_, '\\')) => {
                chars.next();
            }
            Some((_, '(')) => depth += 1,
            Some((_, ')')) => depth -= 1,
            Some(_) => {}
            None => return false,
        }
    }
    true
}

/// Replace RFC 5322 comments outside quoted strings with a single space.
///
/// An unterminated comment swallows the rest of the input.
pub fn strip_comments(input: &str) -> Cow<'_, str> {
    if !input.contains('(') {
        return Cow::Borrowed(input);
    }
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();
    let mut quoted = false;
    while let Some((_, c)) = chars.next() {
        match c {
            '"' => {
                quoted = !quoted;
                out.push(c);
            }
            '\\' if quoted => {
                out.push(c);
                if let Some((_, escaped)) = chars.next() {
                    out.push(escaped);
                }
            }
            '(' if !quoted => {
                skip_comment(&mut chars);
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Parse exactly one mailbox or group from `tokens`.
pub fn parse_address(tokens: &[Token]) -> Result<Address> {
    let mut parser = Parser { tokens, pos: 0 };
    let address = parser.address()?;
    if let Some(extra) = parser.peek() {
        return Err(grammar(format!("unexpected {} after address", describe(extra))));
    }
    Ok(address)
}

/// Parse a comma-separated address list. Empty elements are skipped, so an
/// empty or whitespace-only value gives an empty list.
pub fn parse_address_list(input: &str) -> Result<Vec<Address>> {
    let tokens = tokenize_address_field(input)?;
    Parser {
        tokens: &tokens,
        pos: 0,
    }
    .address_list()
}

/// Parse a header that holds exactly one address (e.g. `Sender`).
pub fn parse_single_address(input: &str) -> Result<Address> {
    let tokens = tokenize_address_field(input)?;
    if tokens.is_empty() {
        return Err(grammar("empty address".into()));
    }
    parse_address(&tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, special: char) -> bool {
        if self.peek() == Some(&Token::Special(special)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, special: char) -> Result<()> {
        if self.eat(special) {
            return Ok(());
        }
        Err(match self.peek() {
            Some(t) => grammar(format!("expected '{special}', found {}", describe(t))),
            None => grammar(format!("expected '{special}', found end of input")),
        })
    }

    fn address_list(&mut self) -> Result<Vec<Address>> {
        let mut out = Vec::new();
        loop {
            while self.eat(',') {}
            if self.peek().is_none() {
                return Ok(out);
            }
            out.push(self.address()?);
            if self.peek().is_some() {
                self.expect(',')?;
            }
        }
    }

    /// `mailbox / group`
    fn address(&mut self) -> Result<Address> {
        let start = self.pos;
        let phrase = self.phrase();
        if !phrase.is_empty() && self.peek() == Some(&Token::Special(':')) {
            self.pos += 1;
            return self.group_rest(phrase).map(Address::Group);
        }
        self.pos = start;
        self.mailbox().map(Address::Mailbox)
    }

    /// Members and terminator of a group whose `name:` was consumed.
    fn group_rest(&mut self, phrase: &[Token]) -> Result<Group> {
        let mut members = Vec::new();
        loop {
            while self.eat(',') {}
            match self.peek() {
                // A missing ';' at the very end is tolerated.
                None => break,
                Some(Token::Special(';')) => {
                    self.pos += 1;
                    break;
                }
                Some(_) => {
                    members.push(self.mailbox()?);
                    if !matches!(self.peek(), None | Some(Token::Special(';'))) {
                        self.expect(',')?;
                    }
                }
            }
        }
        Ok(Group {
            name: render_phrase(phrase),
            members,
        })
    }

    /// `name-addr / addr-spec`
    fn mailbox(&mut self) -> Result<Mailbox> {
        let start = self.pos;
        let phrase = self.phrase();
        if self.eat('<') {
            self.skip_obs_route()?;
            let (local, domain) = self.addr_spec()?;
            self.expect('>')?;
            let mut mailbox = Mailbox::new(local, domain);
            let name = render_phrase(phrase);
            if !name.is_empty() {
                mailbox = mailbox.with_name(name);
            }
            return Ok(mailbox);
        }
        self.pos = start;
        let (local, domain) = self.addr_spec()?;
        Ok(Mailbox::new(local, domain))
    }

    /// Consume display-name words (atoms, quoted strings, and `.` for
    /// obsolete phrases like `John Q. Public`).
    fn phrase(&mut self) -> &'a [Token] {
        let start = self.pos;
        while matches!(
            self.peek(),
            Some(Token::Atom(_) | Token::Quoted(_) | Token::Special('.'))
        ) {
            self.pos += 1;
        }
        &self.tokens[start..self.pos]
    }

    /// Skip `@a.example,@b.example:` inside an angle address.
    fn skip_obs_route(&mut self) -> Result<()> {
        if self.peek() != Some(&Token::Special('@')) {
            return Ok(());
        }
        while let Some(token) = self.bump() {
            if *token == Token::Special(':') {
                return Ok(());
            }
            if *token == Token::Special('>') {
                break;
            }
        }
        Err(grammar("unterminated source route".into()))
    }

    /// `local-part "@" domain`
    fn addr_spec(&mut self) -> Result<(String, String)> {
        let mut local = self.word()?;
        while self.eat('.') {
            local.push('.');
            local.push_str(&self.word()?);
        }
        if !self.eat('@') {
            return Err(match self.peek() {
                Some(t) => grammar(format!("missing '@' before {}", describe(t))),
                None => grammar(format!("missing '@' in address '{local}'")),
            });
        }
        let domain = self.domain()?;
        Ok((local, domain))
    }

    fn word(&mut self) -> Result<String> {
        match self.bump() {
            Some(Token::Atom(atom)) => Ok(atom.clone()),
            Some(Token::Quoted(text)) => Ok(quote_if_needed(text)),
            Some(other) => Err(grammar(format!(
                "expected local part, found {}",
                describe(other)
            ))),
            None => Err(grammar("expected local part, found end of input".into())),
        }
    }

    fn domain(&mut self) -> Result<String> {
        match self.bump() {
            Some(Token::DomainLiteral(literal)) => Ok(format!("[{literal}]")),
            Some(Token::Atom(atom)) => {
                let mut domain = atom.clone();
                while self.eat('.') {
                    match self.bump() {
                        Some(Token::Atom(label)) => {
                            domain.push('.');
                            domain.push_str(label);
                        }
                        _ => return Err(grammar(format!("empty label in domain '{domain}.'"))),
                    }
                }
                Ok(domain)
            }
            Some(other) => Err(grammar(format!("expected domain, found {}", describe(other)))),
            None => Err(grammar("expected domain, found end of input".into())),
        }
    }
}

/// Render a phrase as display text and resolve encoded words.
fn render_phrase(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        match token {
            Token::Atom(word) | Token::Quoted(word) => {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(word);
            }
            Token::Special(c) => out.push(*c),
            Token::DomainLiteral(_) => {}
        }
    }
    decode_or_raw(&out)
}

fn quote_if_needed(text: &str) -> String {
    if !text.is_empty() && text.chars().all(is_atext) {
        return text.to_string();
    }
    let escaped = text.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

fn is_atext(c: char) -> bool {
    !c.is_whitespace()
        && !c.is_control()
        && !SPECIALS.contains(&c)
        && !matches!(c, '(' | ')' | '[' | ']' | '"' | '\\')
}

fn describe(token: &Token) -> String {
    match token {
        Token::Atom(a) => format!("'{a}'"),
        Token::Quoted(q) => format!("\"{q}\""),
        Token::DomainLiteral(d) => format!("[{d}]"),
        Token::Special(c) => format!("'{c}'"),
    }
}

fn lex_error(offset: usize, reason: &str) -> EmlError {
    EmlError::AddressLex {
        offset,
        reason: reason.to_string(),
    }
}

fn grammar(reason: String) -> EmlError {
    EmlError::AddressGrammar(reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mailbox(address: &Address) -> &Mailbox {
        address.as_mailbox().expect("mailbox")
    }

    #[test]
    fn test_tokenize() {
        let tokens = tokenize_address_field("\"Doe, J\" <j@x.com> (work)").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Quoted("Doe, J".into()),
                Token::Special('<'),
                Token::Atom("j".into()),
                Token::Special('@'),
                Token::Atom("x".into()),
                Token::Special('.'),
                Token::Atom("com".into()),
                Token::Special('>'),
            ]
        );
    }

    #[test]
    fn test_tokenize_nested_comment_and_literal() {
        let tokens = tokenize_address_field("a(b (c) \\) d)@[10.0.0.1]").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Atom("a".into()),
                Token::Special('@'),
                Token::DomainLiteral("10.0.0.1".into()),
            ]
        );
    }

    #[test]
    fn test_tokenize_errors() {
        for (input, offset) in [
            ("\"open", 0),
            ("a (comment", 2),
            ("x@[1.2", 2),
            ("a) b", 1),
            ("a] b", 1),
            ("a \\ b", 2),
            ("a\u{7}b", 1),
        ] {
            match tokenize_address_field(input) {
                Err(EmlError::AddressLex { offset: got, .. }) => {
                    assert_eq!(got, offset, "offset for {input:?}")
                }
                other => panic!("expected lex error for {input:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_strip_comments() {
        assert_eq!(strip_comments("no comments"), "no comments");
        assert_eq!(
            strip_comments("12:00 +0200 (CEST (summer))"),
            "12:00 +0200  "
        );
        assert_eq!(strip_comments("\"(kept)\" a(b)c"), "\"(kept)\" a c");
        assert_eq!(strip_comments("x (open"), "x  ");
    }

    #[test]
    fn test_bare_address() {
        let list = parse_address_list("user@example.com").unwrap();
        assert_eq!(list.len(), 1);
        let m = mailbox(&list[0]);
        assert_eq!(m.name, None);
        assert_eq!(m.address(), "user@example.com");
    }

    #[test]
    fn test_name_addr() {
        let list = parse_address_list("John Q. Public <john.q@example.com>").unwrap();
        let m = mailbox(&list[0]);
        assert_eq!(m.name.as_deref(), Some("John Q. Public"));
        assert_eq!(m.local_part, "john.q");
        assert_eq!(m.domain, "example.com");
    }

    #[test]
    fn test_quoted_name_with_comma() {
        let list = parse_address_list("\"Doe, Jane\" <jane@x.com>, bob@y.org").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(mailbox(&list[0]).name.as_deref(), Some("Doe, Jane"));
        assert_eq!(mailbox(&list[1]).address(), "bob@y.org");
    }

    #[test]
    fn test_encoded_display_name() {
        let list = parse_address_list("=?UTF-8?Q?Jos=C3=A9?= <jose@x.es>").unwrap();
        assert_eq!(mailbox(&list[0]).name.as_deref(), Some("José"));
    }

    #[test]
    fn test_encoded_comma_does_not_split() {
        // "Doe, J" encoded; the comma only appears after decoding.
        let list = parse_address_list("=?UTF-8?B?RG9lLCBK?= <j@x.com>").unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(mailbox(&list[0]).name.as_deref(), Some("Doe, J"));
    }

    #[test]
    fn test_group() {
        let list = parse_address_list("Team: a@x.com, Bee <b@x.com>;, c@y.com").unwrap();
        assert_eq!(list.len(), 2);
        match &list[0] {
            Address::Group(g) => {
                assert_eq!(g.name, "Team");
                assert_eq!(g.members.len(), 2);
                assert_eq!(g.members[1].name.as_deref(), Some("Bee"));
            }
            other => panic!("expected group, got {other:?}"),
        }
        assert_eq!(mailbox(&list[1]).address(), "c@y.com");
    }

    #[test]
    fn test_empty_group() {
        let list = parse_address_list("undisclosed-recipients:;").unwrap();
        assert_eq!(
            list,
            vec![Address::Group(Group {
                name: "undisclosed-recipients".into(),
                members: vec![],
            })]
        );
        // Missing terminator at end of input.
        assert!(parse_address_list("Undisclosed recipients:").is_ok());
    }

    #[test]
    fn test_empty_elements_skipped() {
        let list = parse_address_list(" , a@x.com,, b@x.com ,").unwrap();
        assert_eq!(list.len(), 2);
        assert!(parse_address_list("").unwrap().is_empty());
        assert!(parse_address_list("  ").unwrap().is_empty());
    }

    #[test]
    fn test_quoted_local_part_and_literal() {
        let list = parse_address_list("\"john doe\"@[192.168.0.1]").unwrap();
        let m = mailbox(&list[0]);
        assert_eq!(m.local_part, "\"john doe\"");
        assert_eq!(m.domain, "[192.168.0.1]");
    }

    #[test]
    fn test_obs_route_skipped() {
        let list = parse_address_list("<@relay.net,@other.net:user@x.com>").unwrap();
        assert_eq!(mailbox(&list[0]).address(), "user@x.com");
    }

    #[test]
    fn test_grammar_errors() {
        for input in [
            "not-an-address",
            "a@",
            "a@b.",
            "<a@b.com",
            "Name <>",
            "a@b.com c@d.com",
            "@b.com",
        ] {
            assert!(
                matches!(parse_address_list(input), Err(EmlError::AddressGrammar(_))),
                "expected grammar error for {input:?}"
            );
        }
    }

    #[test]
    fn test_parse_single_address() {
        let addr = parse_single_address("Sec <sec@x.com>").unwrap();
        assert_eq!(addr.to_string(), "Sec <sec@x.com>");
        assert!(parse_single_address("").is_err());
        assert!(parse_single_address("a@x.com, b@x.com").is_err());
    }

    #[test]
    fn test_parse_address_tokens() {
        let tokens = tokenize_address_field("a@b.c").unwrap();
        let addr = parse_address(&tokens).unwrap();
        assert_eq!(mailbox(&addr).address(), "a@b.c");
    }
}
