//! Statement-shape recognition.
//!
//! The gateway never parses SQL in full -- parse, plan, and execute all
//! belong to the engine. It only needs to recognize the handful of statement
//! shapes that drive scheduling and catalog synchronization: the
//! pool-assignment command and the DDL vocabulary that must be mirrored into
//! the catalog. Everything else classifies as [`ResolvedCommand::Other`].

use crate::types::ColumnDesc;

/// Coarse query type, derived once from statement shape and the cursor flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Begin,
    Fetch,
    Select,
}

impl QueryType {
    pub fn derive(statement: &str, is_cursor: bool) -> Self {
        let first = statement
            .split_whitespace()
            .next()
            .unwrap_or_default();
        if first.eq_ignore_ascii_case("begin") {
            QueryType::Begin
        } else if is_cursor {
            QueryType::Fetch
        } else {
            QueryType::Select
        }
    }
}

/// The logical command a statement resolves to, as far as the gateway cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedCommand {
    /// `SET key=value`; recognized as a pool assignment when the key matches
    /// the configured pool-setting key.
    SetConfig { key: String, value: String },
    CreateDatabase {
        name: String,
    },
    CreateTable {
        database: Option<String>,
        table: String,
        /// Empty for `CREATE TABLE .. AS SELECT`; the engine's result schema
        /// stands in for it at registration time.
        columns: Vec<ColumnDesc>,
        external: bool,
    },
    CreateView {
        database: Option<String>,
        view: String,
        /// The defining query, verbatim, for schema re-resolution.
        query: String,
    },
    CreateFunction {
        database: Option<String>,
        name: String,
    },
    DropDatabase {
        name: String,
    },
    DropTable {
        database: Option<String>,
        table: String,
    },
    DropFunction {
        database: Option<String>,
        name: String,
    },
    /// Queries, DML, transaction control -- nothing the catalog mirrors.
    Other,
}

impl ResolvedCommand {
    pub fn classify(statement: &str) -> Self {
        let tokens = tokenize(statement);
        let mut cur = Cursor::new(&tokens);

        if cur.eat_keyword("set") {
            return classify_set(&mut cur);
        }
        if cur.eat_keyword("create") {
            return classify_create(statement, &mut cur);
        }
        if cur.eat_keyword("drop") {
            return classify_drop(&mut cur);
        }
        ResolvedCommand::Other
    }
}

fn classify_set(cur: &mut Cursor) -> ResolvedCommand {
    let mut key = String::new();
    while let Some(tok) = cur.peek() {
        if tok.text == "=" {
            break;
        }
        key.push_str(&tok.text);
        cur.advance();
    }
    if !cur.eat_punct("=") || key.is_empty() {
        return ResolvedCommand::Other;
    }
    let mut value = String::new();
    while let Some(tok) = cur.peek() {
        if tok.text == ";" {
            break;
        }
        value.push_str(&tok.text);
        cur.advance();
    }
    ResolvedCommand::SetConfig { key, value }
}

fn classify_create(statement: &str, cur: &mut Cursor) -> ResolvedCommand {
    // CREATE [OR REPLACE] [TEMPORARY] [EXTERNAL] <object> ...
    while cur.eat_keyword("or") || cur.eat_keyword("replace") || cur.eat_keyword("temporary") {}
    let external = cur.eat_keyword("external");

    if cur.eat_keyword("database") || cur.eat_keyword("schema") {
        cur.skip_existence_clause();
        return match cur.qualified_name() {
            Some((_, name)) => ResolvedCommand::CreateDatabase { name },
            None => ResolvedCommand::Other,
        };
    }
    if cur.eat_keyword("table") {
        cur.skip_existence_clause();
        let Some((database, table)) = cur.qualified_name() else {
            return ResolvedCommand::Other;
        };
        let columns = cur.column_defs();
        return ResolvedCommand::CreateTable {
            database,
            table,
            columns,
            external,
        };
    }
    if cur.eat_keyword("view") {
        cur.skip_existence_clause();
        let Some((database, view)) = cur.qualified_name() else {
            return ResolvedCommand::Other;
        };
        cur.skip_parenthesized();
        if !cur.eat_keyword("as") {
            return ResolvedCommand::Other;
        }
        let Some(tok) = cur.peek() else {
            return ResolvedCommand::Other;
        };
        let query = statement[tok.offset..].trim_end_matches(';').trim().to_string();
        return ResolvedCommand::CreateView {
            database,
            view,
            query,
        };
    }
    if cur.eat_keyword("function") {
        let Some((database, name)) = cur.qualified_name() else {
            return ResolvedCommand::Other;
        };
        return ResolvedCommand::CreateFunction { database, name };
    }
    ResolvedCommand::Other
}

fn classify_drop(cur: &mut Cursor) -> ResolvedCommand {
    while cur.eat_keyword("temporary") {}
    if cur.eat_keyword("database") || cur.eat_keyword("schema") {
        cur.skip_existence_clause();
        return match cur.qualified_name() {
            Some((_, name)) => ResolvedCommand::DropDatabase { name },
            None => ResolvedCommand::Other,
        };
    }
    if cur.eat_keyword("table") {
        cur.skip_existence_clause();
        return match cur.qualified_name() {
            Some((database, table)) => ResolvedCommand::DropTable { database, table },
            None => ResolvedCommand::Other,
        };
    }
    if cur.eat_keyword("function") {
        cur.skip_existence_clause();
        return match cur.qualified_name() {
            Some((database, name)) => ResolvedCommand::DropFunction { database, name },
            None => ResolvedCommand::Other,
        };
    }
    ResolvedCommand::Other
}

/// A token with its byte offset into the original statement.
struct Token {
    text: String,
    offset: usize,
}

/// Splits a statement into words, punctuation, and unquoted string contents.
/// Quoting styles (`'`, `"`, backtick) are stripped; the recognizer only
/// cares about shape.
fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some(&(i, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if matches!(c, '(' | ')' | ',' | '=' | '.' | ';') {
            tokens.push(Token {
                text: c.to_string(),
                offset: i,
            });
            chars.next();
            continue;
        }
        if matches!(c, '\'' | '"' | '`') {
            let quote = c;
            chars.next();
            let mut text = String::new();
            for (_, ch) in chars.by_ref() {
                if ch == quote {
                    break;
                }
                text.push(ch);
            }
            tokens.push(Token { text, offset: i });
            continue;
        }
        let start = i;
        let mut text = String::new();
        while let Some(&(_, ch)) = chars.peek() {
            if ch.is_whitespace() || matches!(ch, '(' | ')' | ',' | '=' | '.' | ';' | '\'' | '"' | '`')
            {
                break;
            }
            text.push(ch);
            chars.next();
        }
        tokens.push(Token { text, offset: start });
    }
    tokens
}

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some(tok) if tok.text.eq_ignore_ascii_case(keyword) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        match self.peek() {
            Some(tok) if tok.text == punct => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    /// Skips `IF EXISTS` / `IF NOT EXISTS`.
    fn skip_existence_clause(&mut self) {
        if self.eat_keyword("if") {
            self.eat_keyword("not");
            self.eat_keyword("exists");
        }
    }

    /// `name` or `db.name`.
    fn qualified_name(&mut self) -> Option<(Option<String>, String)> {
        let first = self.advance()?.text.clone();
        if self.eat_punct(".") {
            let second = self.advance()?.text.clone();
            Some((Some(first), second))
        } else {
            Some((None, first))
        }
    }

    /// Skips a balanced parenthesized group if one starts here.
    fn skip_parenthesized(&mut self) {
        if !self.eat_punct("(") {
            return;
        }
        let mut depth = 1usize;
        while let Some(tok) = self.advance() {
            match tok.text.as_str() {
                "(" => depth += 1,
                ")" => {
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    /// Parses a `(name type, ...)` column list; constraint entries are
    /// skipped. Returns empty when no list follows (e.g. CTAS).
    fn column_defs(&mut self) -> Vec<ColumnDesc> {
        if !self.eat_punct("(") {
            return Vec::new();
        }
        let mut columns = Vec::new();
        loop {
            match self.peek() {
                None => break,
                Some(tok) if tok.text == ")" => {
                    self.advance();
                    break;
                }
                _ => {}
            }
            let mut parts: Vec<String> = Vec::new();
            let mut depth = 0usize;
            while let Some(tok) = self.peek() {
                match tok.text.as_str() {
                    "(" => {
                        depth += 1;
                        parts.push("(".into());
                        self.advance();
                    }
                    ")" if depth == 0 => break,
                    ")" => {
                        depth -= 1;
                        parts.push(")".into());
                        self.advance();
                    }
                    "," if depth == 0 => break,
                    other => {
                        parts.push(other.to_string());
                        self.advance();
                    }
                }
            }
            if let Some((name, rest)) = parts.split_first() {
                if !is_constraint_keyword(name) && !rest.is_empty() {
                    columns.push(ColumnDesc::new(name.clone(), render_type(rest)));
                }
            }
            if !self.eat_punct(",") {
                // next token is ')' or the list was malformed; both end here
                if self.eat_punct(")") {
                    break;
                }
                break;
            }
        }
        columns
    }
}

fn is_constraint_keyword(word: &str) -> bool {
    [
        "primary",
        "foreign",
        "constraint",
        "unique",
        "key",
        "check",
        "index",
    ]
    .iter()
    .any(|kw| word.eq_ignore_ascii_case(kw))
}

/// Rejoins type tokens without spaces around parentheses and commas, so
/// `decimal ( 10 , 2 )` renders as `decimal(10,2)`.
fn render_type(parts: &[String]) -> String {
    let mut out = String::new();
    for part in parts {
        match part.as_str() {
            "(" => out.push('('),
            ")" => out.push(')'),
            "," => out.push(','),
            _ => {
                if !out.is_empty() && !out.ends_with('(') && !out.ends_with(',') {
                    out.push(' ');
                }
                out.push_str(part);
            }
        }
    }
    out
}
