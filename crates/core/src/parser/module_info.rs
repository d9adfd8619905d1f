use crate::{
    error::{Error, Result},
    module::descriptor::{JAVA_BASE, ModuleDescriptor, RequiresModifier},
};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// Comments, string literals, (qualified) identifiers and single symbols.
/// Qualified names may contain whitespace around their dots.
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)//[^\n]*|/\*.*?\*/|"(?:\\.|[^"\\])*"|[A-Za-z_$][A-Za-z0-9_$]*(?:\s*\.\s*[A-Za-z_$][A-Za-z0-9_$]*)*|\S"#,
    )
    .unwrap()
});

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    text: &'a str,
    offset: usize,
}

impl Token<'_> {
    fn is_name(&self) -> bool {
        self.text
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
    }

    /// The token as a qualified name with inner whitespace removed
    fn name(&self) -> String {
        self.text.split_whitespace().collect()
    }
}

/// Parse the contents of a `module-info.java` compilation unit.
///
/// `location` is only used in error messages. Every module except
/// `java.base` implicitly requires `java.base`.
pub fn parse_module_source(source: &str, location: &str) -> Result<ModuleDescriptor> {
    let tokens = TOKEN_RE
        .find_iter(source)
        .filter(|m| !m.as_str().starts_with("//") && !m.as_str().starts_with("/*"))
        .map(|m| Token {
            text: m.as_str(),
            offset: m.start(),
        })
        .collect();
    ModuleInfoParser {
        source,
        location,
        tokens,
        pos: 0,
    }
    .parse()
}

/// Read and parse a `module-info.java` file
pub fn parse_module_file(path: &Path) -> Result<ModuleDescriptor> {
    let source = std::fs::read_to_string(path)?;
    parse_module_source(&source, &path.display().to_string())
}

struct ModuleInfoParser<'a> {
    source: &'a str,
    location: &'a str,
    tokens: Vec<Token<'a>>,
    pos: usize,
}

impl<'a> ModuleInfoParser<'a> {
    fn parse(mut self) -> Result<ModuleDescriptor> {
        self.skip_imports()?;
        self.skip_annotations()?;

        let open = self.eat("open");
        self.expect("module")?;
        let name = self.expect_name()?;
        self.expect("{")?;

        let mut descriptor = ModuleDescriptor::new(name).with_open(open);
        loop {
            let Some(token) = self.next() else {
                return Err(self.error_at_end("unterminated module declaration"));
            };
            descriptor = match token.text {
                "}" => break,
                "requires" => self.requires(descriptor)?,
                "exports" => {
                    let (package, targets) = self.package_and_targets()?;
                    descriptor.with_exports_to(package, targets)
                }
                "opens" => {
                    if open {
                        return Err(self.error(token, "an open module cannot declare 'opens'"));
                    }
                    let (package, targets) = self.package_and_targets()?;
                    descriptor.with_opens_to(package, targets)
                }
                "uses" => {
                    let service = self.expect_name()?;
                    self.expect(";")?;
                    descriptor.with_uses(service)
                }
                "provides" => {
                    let service = self.expect_name()?;
                    self.expect("with")?;
                    let providers = self.name_list()?;
                    self.expect(";")?;
                    descriptor.with_provides(service, providers)
                }
                other => {
                    return Err(self.error(token, &format!("unexpected '{other}' in module body")));
                }
            };
        }

        if let Some(token) = self.peek() {
            return Err(self.error(token, "unexpected content after module declaration"));
        }

        if descriptor.name() != JAVA_BASE && !descriptor.requires_module(JAVA_BASE) {
            descriptor = descriptor.with_requires(JAVA_BASE, [RequiresModifier::Mandated]);
        }
        Ok(descriptor)
    }

    fn requires(&mut self, descriptor: ModuleDescriptor) -> Result<ModuleDescriptor> {
        let mut modifiers = Vec::new();
        // `requires transitive;` names a module called "transitive"
        while let Some(token) = self.peek() {
            let modifier = match token.text {
                "transitive" => RequiresModifier::Transitive,
                "static" => RequiresModifier::Static,
                _ => break,
            };
            if self.peek_at(1).is_some_and(|next| next.text == ";") {
                break;
            }
            self.pos += 1;
            modifiers.push(modifier);
        }
        let module = self.expect_name()?;
        self.expect(";")?;
        Ok(descriptor.with_requires(module, modifiers))
    }

    fn package_and_targets(&mut self) -> Result<(String, Vec<String>)> {
        let package = self.expect_name()?;
        let targets = if self.eat("to") {
            self.name_list()?
        } else {
            Vec::new()
        };
        self.expect(";")?;
        Ok((package, targets))
    }

    fn name_list(&mut self) -> Result<Vec<String>> {
        let mut names = vec![self.expect_name()?];
        while self.eat(",") {
            names.push(self.expect_name()?);
        }
        Ok(names)
    }

    fn skip_imports(&mut self) -> Result<()> {
        while self.eat("import") {
            loop {
                match self.next() {
                    Some(token) if token.text == ";" => break,
                    Some(_) => {}
                    None => return Err(self.error_at_end("unterminated import")),
                }
            }
        }
        Ok(())
    }

    fn skip_annotations(&mut self) -> Result<()> {
        while self.eat("@") {
            self.expect_name()?;
            if !self.eat("(") {
                continue;
            }
            let mut depth = 1;
            while depth > 0 {
                match self.next().map(|token| token.text) {
                    Some("(") => depth += 1,
                    Some(")") => depth -= 1,
                    Some(_) => {}
                    None => return Err(self.error_at_end("unterminated annotation")),
                }
            }
        }
        Ok(())
    }

    fn peek(&self) -> Option<Token<'a>> {
        self.tokens.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<Token<'a>> {
        self.tokens.get(self.pos + ahead).copied()
    }

    fn next(&mut self) -> Option<Token<'a>> {
        let token = self.peek()?;
        self.pos += 1;
        Some(token)
    }

    fn eat(&mut self, text: &str) -> bool {
        if self.peek().is_some_and(|token| token.text == text) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, text: &str) -> Result<()> {
        match self.next() {
            Some(token) if token.text == text => Ok(()),
            Some(token) => Err(self.error(
                token,
                &format!("expected '{text}', found '{}'", token.text),
            )),
            None => Err(self.error_at_end(&format!("expected '{text}'"))),
        }
    }

    fn expect_name(&mut self) -> Result<String> {
        match self.next() {
            Some(token) if token.is_name() => Ok(token.name()),
            Some(token) => Err(self.error(
                token,
                &format!("expected a name, found '{}'", token.text),
            )),
            None => Err(self.error_at_end("expected a name")),
        }
    }

    fn error(&self, token: Token<'_>, message: &str) -> Error {
        let line = self.source[..token.offset].matches('\n').count() + 1;
        Error::ModuleParse {
            location: format!("{}:{}", self.location, line),
            message: message.to_string(),
        }
    }

    fn error_at_end(&self, message: &str) -> Error {
        Error::ModuleParse {
            location: self.location.to_string(),
            message: format!("{message} before end of file"),
        }
    }
}
