//! `go.mod` reader: module path, requirements and replacements.

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_till1},
    character::complete::{char, space0, space1},
    combinator::{all_consuming, map, opt, verify},
    sequence::{delimited, preceded, tuple},
    IResult,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Require {
    pub path: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replace {
    pub old: String,
    pub old_version: Option<String>,
    /// Module path, or a directory when it starts with `./`, `../` or `/`.
    pub new: String,
    pub new_version: Option<String>,
}

impl Replace {
    pub fn is_local(&self) -> bool {
        self.new.starts_with("./") || self.new.starts_with("../") || self.new.starts_with('/')
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoMod {
    pub module: String,
    pub go: Option<String>,
    pub requires: Vec<Require>,
    pub replaces: Vec<Replace>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("go.mod line {line}: {message}")]
pub struct GoModError {
    pub line: usize,
    pub message: String,
}

impl GoMod {
    pub fn parse(text: &str) -> Result<Self, GoModError> {
        let mut gomod = GoMod::default();
        let mut block: Option<String> = None;
        for (n, raw) in text.lines().enumerate() {
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }
            let fail = |message: String| GoModError { line: n + 1, message };
            if let Some(verb) = &block {
                if line == ")" {
                    block = None;
                } else {
                    gomod.apply(verb, line).map_err(fail)?;
                }
                continue;
            }
            let (rest, verb) = word(line).map_err(|_| fail(format!("expected directive in `{line}`")))?;
            let rest = rest.trim();
            if rest == "(" {
                block = Some(verb.to_string());
                continue;
            }
            gomod.apply(verb, rest).map_err(fail)?;
        }
        if gomod.module.is_empty() {
            return Err(GoModError {
                line: 0,
                message: "missing module directive".to_string(),
            });
        }
        Ok(gomod)
    }

    fn apply(&mut self, verb: &str, rest: &str) -> Result<(), String> {
        let bad = |_| format!("malformed {verb} directive `{rest}`");
        match verb {
            "module" => self.module = all_consuming(token)(rest).map_err(bad)?.1.to_string(),
            "go" => self.go = Some(all_consuming(token)(rest).map_err(bad)?.1.to_string()),
            "require" => self.requires.push(all_consuming(require_line)(rest).map_err(bad)?.1),
            "replace" => self.replaces.push(all_consuming(replace_line)(rest).map_err(bad)?.1),
            // exclude, retract, toolchain, godebug
            _ => {}
        }
        Ok(())
    }

    pub fn require(&self, path: &str) -> Option<&Require> {
        self.requires.iter().find(|r| r.path == path)
    }

    /// Replacement in effect for `path` at `version`. A version-specific
    /// replacement wins over a blanket one.
    pub fn replacement(&self, path: &str, version: Option<&str>) -> Option<&Replace> {
        let matching = self.replaces.iter().filter(|r| r.old == path);
        let mut blanket = None;
        for replace in matching {
            match (&replace.old_version, version) {
                (Some(v), Some(want)) if v == want => return Some(replace),
                (None, _) => blanket = Some(replace),
                _ => {}
            }
        }
        blanket
    }

    /// Required or replaced module that provides `import_path`, longest
    /// module path first, and the package's path inside it.
    pub fn owning_module<'a>(&'a self, import_path: &'a str) -> Option<(&'a str, &'a str)> {
        let candidates = self
            .requires
            .iter()
            .map(|r| r.path.as_str())
            .chain(self.replaces.iter().map(|r| r.old.as_str()));
        candidates
            .filter_map(|module| sub_path(import_path, module).map(|sub| (module, sub)))
            .max_by_key(|(module, _)| module.len())
    }
}

fn sub_path<'a>(import_path: &'a str, module: &str) -> Option<&'a str> {
    let rest = import_path.strip_prefix(module)?;
    if rest.is_empty() {
        Some("")
    } else {
        rest.strip_prefix('/')
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find("//") {
        Some(at) => &line[..at],
        None => line,
    }
}

fn word(input: &str) -> IResult<&str, &str> {
    take_till1(|c: char| c.is_whitespace() || c == '(')(input)
}

fn quoted(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('"'), is_not("\""), char('"')),
        delimited(char('`'), is_not("`"), char('`')),
    ))(input)
}

fn token(input: &str) -> IResult<&str, &str> {
    alt((quoted, verify(take_till1(|c: char| c.is_whitespace()), |t: &str| t != "=>")))(input)
}

fn require_line(input: &str) -> IResult<&str, Require> {
    map(
        tuple((token, preceded(space1, token), space0)),
        |(path, version, _)| Require {
            path: path.to_string(),
            version: version.to_string(),
        },
    )(input)
}

fn replace_line(input: &str) -> IResult<&str, Replace> {
    map(
        tuple((
            token,
            opt(preceded(space1, token)),
            delimited(space0, tag("=>"), space0),
            token,
            opt(preceded(space1, token)),
            space0,
        )),
        |(old, old_version, _, new, new_version, _)| Replace {
            old: old.to_string(),
            old_version: old_version.map(str::to_string),
            new: new.to_string(),
            new_version: new_version.map(str::to_string),
        },
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOMOD: &str = r#"module example.com/shop

go 1.22

require (
	github.com/IBM/sarama v1.43.0 // indirect
	github.com/gin-gonic/gin v1.9.1
)

require google.golang.org/grpc v1.62.0

replace github.com/IBM/sarama => ../sarama

replace (
	google.golang.org/grpc v1.62.0 => github.com/fork/grpc v1.62.1
	google.golang.org/grpc => github.com/other/grpc v1.0.0
)
"#;

    #[test]
    fn test_parse_blocks_and_single_lines() {
        let gomod = GoMod::parse(GOMOD).unwrap();
        assert_eq!(gomod.module, "example.com/shop");
        assert_eq!(gomod.go.as_deref(), Some("1.22"));
        assert_eq!(gomod.requires.len(), 3);
        assert_eq!(gomod.require("github.com/gin-gonic/gin").unwrap().version, "v1.9.1");
        assert_eq!(gomod.replaces.len(), 3);
        assert!(gomod.replaces[0].is_local());
    }

    #[test]
    fn test_versioned_replacement_wins() {
        let gomod = GoMod::parse(GOMOD).unwrap();
        let r = gomod.replacement("google.golang.org/grpc", Some("v1.62.0")).unwrap();
        assert_eq!(r.new, "github.com/fork/grpc");
        let r = gomod.replacement("google.golang.org/grpc", Some("v1.61.0")).unwrap();
        assert_eq!(r.new, "github.com/other/grpc");
    }

    #[test]
    fn test_owning_module_prefers_longest() {
        let gomod = GoMod::parse(
            "module m\n\nrequire (\n\tgithub.com/a/b v1.0.0\n\tgithub.com/a/b/c v1.0.0\n)\n",
        )
        .unwrap();
        assert_eq!(
            gomod.owning_module("github.com/a/b/c/d"),
            Some(("github.com/a/b/c", "d"))
        );
        assert_eq!(gomod.owning_module("github.com/a/b"), Some(("github.com/a/b", "")));
        assert_eq!(gomod.owning_module("github.com/a/bc"), None);
    }

    #[test]
    fn test_missing_module_is_an_error() {
        let err = GoMod::parse("go 1.21\n").unwrap_err();
        assert!(err.message.contains("module"));
    }
}
