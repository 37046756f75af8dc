//! Substitution of the four fixed markers into command templates.
//!
//! Resolution is a single left-to-right scan. Substituted text is never
//! scanned again, so a test named `{FILE}` stays `{FILE}` and the result does
//! not depend on which marker is handled first.

use benchify_error::InterpolationError;

/// The closed set of markers a template may contain.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Interpolant {
    Name,
    Tag,
    File,
    Args,
}

impl Interpolant {
    pub const ALL: [Interpolant; 4] = [
        Interpolant::Name,
        Interpolant::Tag,
        Interpolant::File,
        Interpolant::Args,
    ];

    pub fn marker(self) -> &'static str {
        match self {
            Interpolant::Name => "{NAME}",
            Interpolant::Tag => "{TAG}",
            Interpolant::File => "{FILE}",
            Interpolant::Args => "{...}",
        }
    }
}

/// Values for one (test, tag) resolution.
#[derive(Debug, Clone, Copy)]
pub struct InterpolationContext<'a> {
    pub name: &'a str,
    pub tag: &'a str,
    pub file: Option<&'a str>,
    pub extra_args: &'a [String],
}

/// How `{...}` renders inside a string.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ArgsStyle {
    /// Each argument single-quoted, joined by spaces.
    Shell,
    /// Arguments joined by spaces, no quoting (argv tokens never see a shell).
    Plain,
}

#[derive(Debug, Copy, Clone)]
enum Token {
    Marker(Interpolant),
    /// `'{...}'` or `"{...}"`: the author already quoted the marker.
    QuotedArgs(char),
}

impl InterpolationContext<'_> {
    fn render(&self, interpolant: Interpolant, style: ArgsStyle) -> Result<String, InterpolationError> {
        match interpolant {
            Interpolant::Name => Ok(self.name.to_string()),
            Interpolant::Tag => Ok(self.tag.to_string()),
            Interpolant::File => self.file.map(str::to_string).ok_or_else(|| {
                InterpolationError::MissingValue {
                    marker: Interpolant::File.marker(),
                    test: self.name.to_string(),
                }
            }),
            Interpolant::Args => Ok(match style {
                ArgsStyle::Shell => self
                    .extra_args
                    .iter()
                    .map(|a| shell_quote(a))
                    .collect::<Vec<_>>()
                    .join(" "),
                ArgsStyle::Plain => self.extra_args.join(" "),
            }),
        }
    }

    fn render_quoted(&self, quote: char) -> String {
        let joined = self.extra_args.join(" ");
        match quote {
            '\'' => format!("'{}'", joined.replace('\'', "'\\''")),
            _ => {
                let mut out = String::with_capacity(joined.len() + 2);
                out.push('"');
                for c in joined.chars() {
                    if matches!(c, '"' | '\\' | '$' | '`') {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push('"');
                out
            }
        }
    }
}

/// Quote one word for a POSIX shell.
pub fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "'\\''"))
}

fn match_token(rest: &str, style: ArgsStyle) -> Option<(Token, usize)> {
    if style == ArgsStyle::Shell {
        for quote in ['\'', '"'] {
            let quoted = format!("{quote}{}{quote}", Interpolant::Args.marker());
            if rest.starts_with(&quoted) {
                return Some((Token::QuotedArgs(quote), quoted.len()));
            }
        }
    }
    Interpolant::ALL
        .into_iter()
        .find(|i| rest.starts_with(i.marker()))
        .map(|i| (Token::Marker(i), i.marker().len()))
}

fn resolve_str(
    template: &str,
    ctx: &InterpolationContext<'_>,
    style: ArgsStyle,
) -> Result<String, InterpolationError> {
    let is_start = |c: char| c == '{' || (style == ArgsStyle::Shell && (c == '\'' || c == '"'));

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(pos) = rest.find(is_start) {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match match_token(rest, style) {
            Some((Token::Marker(i), len)) => {
                out.push_str(&ctx.render(i, style)?);
                rest = &rest[len..];
            }
            Some((Token::QuotedArgs(q), len)) => {
                out.push_str(&ctx.render_quoted(q));
                rest = &rest[len..];
            }
            None => {
                let len = rest.chars().next().map_or(1, char::len_utf8);
                out.push_str(&rest[..len]);
                rest = &rest[len..];
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

/// Resolve a shell-command template.
pub fn resolve_shell(
    template: &str,
    ctx: &InterpolationContext<'_>,
) -> Result<String, InterpolationError> {
    resolve_str(template, ctx, ArgsStyle::Shell)
}

/// Bare `...` is accepted as a whole-token splice alongside `{...}`.
const BARE_ARGS_TOKEN: &str = "...";

fn is_splice(token: &str) -> bool {
    token == Interpolant::Args.marker() || token == BARE_ARGS_TOKEN
}

/// Resolve an argument-vector template.
///
/// A token that is exactly `{...}` or `...` splices the extra arguments in
/// its place.
pub fn resolve_args(
    template: &[String],
    ctx: &InterpolationContext<'_>,
) -> Result<Vec<String>, InterpolationError> {
    let mut out = Vec::with_capacity(template.len() + ctx.extra_args.len());
    for token in template {
        if is_splice(token) {
            out.extend(ctx.extra_args.iter().cloned());
        } else {
            out.push(resolve_str(token, ctx, ArgsStyle::Plain)?);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ctx<'a>(file: Option<&'a str>, extra: &'a [String]) -> InterpolationContext<'a> {
        InterpolationContext {
            name: "small",
            tag: "text",
            file,
            extra_args: extra,
        }
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn shell_template_substitutes_every_marker() {
        let extra = strings(&["-9", "a b"]);
        let out = resolve_shell("run {NAME} {TAG} {FILE} {...}", &ctx(Some("in.txt"), &extra)).unwrap();
        assert_eq!(out, "run small text in.txt '-9' 'a b'");
    }

    #[test]
    fn shell_args_escape_single_quotes() {
        let extra = strings(&["it's"]);
        let out = resolve_shell("echo {...}", &ctx(None, &extra)).unwrap();
        assert_eq!(out, r#"echo 'it'\''s'"#);
    }

    #[test]
    fn quoted_marker_becomes_one_shell_word() {
        let extra = strings(&["a", "b"]);
        assert_eq!(
            resolve_shell("x '{...}'", &ctx(None, &extra)).unwrap(),
            "x 'a b'"
        );
        assert_eq!(
            resolve_shell("x \"{...}\"", &ctx(None, &extra)).unwrap(),
            "x \"a b\""
        );
    }

    #[test]
    fn argv_marker_splices_elements() {
        let extra = strings(&["--level", "3"]);
        let template = strings(&["--optimize", "{...}", "{FILE}"]);
        let out = resolve_args(&template, &ctx(Some("x"), &extra)).unwrap();
        assert_eq!(out, strings(&["--optimize", "--level", "3", "x"]));
    }

    #[test]
    fn bare_ellipsis_token_splices_too() {
        let extra = strings(&["-9"]);
        let template = strings(&["...", "{FILE}", "a...b"]);
        let out = resolve_args(&template, &ctx(Some("x"), &extra)).unwrap();
        assert_eq!(out, strings(&["-9", "x", "a...b"]));
        // Only argv tokens splice; shell text keeps a bare ellipsis.
        assert_eq!(resolve_shell("echo ...", &ctx(None, &extra)).unwrap(), "echo ...");
    }

    #[test]
    fn argv_marker_with_no_args_disappears() {
        let template = strings(&["a", "{...}", "b"]);
        let out = resolve_args(&template, &ctx(None, &[])).unwrap();
        assert_eq!(out, strings(&["a", "b"]));
    }

    #[test]
    fn argv_embedded_marker_joins_unquoted() {
        let extra = strings(&["x", "y"]);
        let template = strings(&["--flags={...}"]);
        let out = resolve_args(&template, &ctx(None, &extra)).unwrap();
        assert_eq!(out, strings(&["--flags=x y"]));
    }

    #[test]
    fn unknown_markers_pass_through() {
        let out = resolve_shell("echo {HOME} {NAME} {", &ctx(None, &[])).unwrap();
        assert_eq!(out, "echo {HOME} small {");
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = resolve_shell("cat {FILE}", &ctx(None, &[])).unwrap_err();
        assert_eq!(
            err,
            InterpolationError::MissingValue {
                marker: "{FILE}",
                test: "small".into()
            }
        );
        let err = resolve_args(&strings(&["{FILE}"]), &ctx(None, &[])).unwrap_err();
        assert!(matches!(err, InterpolationError::MissingValue { .. }));
    }

    #[test]
    fn substituted_text_is_not_rescanned() {
        let c = InterpolationContext {
            name: "{FILE}",
            tag: "t",
            file: None,
            extra_args: &[],
        };
        assert_eq!(resolve_shell("{NAME}", &c).unwrap(), "{FILE}");
    }

    #[test]
    fn multibyte_text_survives() {
        let out = resolve_shell("é {NAME} ü{", &ctx(None, &[])).unwrap();
        assert_eq!(out, "é small ü{");
    }

    fn fragment() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-z0-9 ./-]{0,8}",
            Just("{NAME}".to_string()),
            Just("{TAG}".to_string()),
            Just("{FILE}".to_string()),
            Just("{...}".to_string()),
        ]
    }

    fn template() -> impl Strategy<Value = String> {
        proptest::collection::vec(fragment(), 0..10).prop_map(|v| v.concat())
    }

    fn value() -> impl Strategy<Value = String> {
        "[a-z0-9 ._-]{0,10}"
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn full_context_leaves_no_marker_text(
            tpl in template(),
            name in value(),
            tag in value(),
            file in value(),
            extra in proptest::collection::vec(value(), 0..4),
        ) {
            let c = InterpolationContext { name: &name, tag: &tag, file: Some(&file), extra_args: &extra };
            let out = resolve_shell(&tpl, &c).unwrap();
            for i in Interpolant::ALL {
                prop_assert!(!out.contains(i.marker()), "{} left in {:?}", i.marker(), out);
            }
        }

        #[test]
        fn argv_splice_length_matches(
            tokens in proptest::collection::vec(fragment(), 0..8),
            extra in proptest::collection::vec(value(), 0..4),
        ) {
            let c = InterpolationContext { name: "n", tag: "t", file: Some("f"), extra_args: &extra };
            let out = resolve_args(&tokens, &c).unwrap();
            let spliced = tokens.iter().filter(|t| is_splice(t)).count();
            prop_assert_eq!(out.len(), tokens.len() - spliced + spliced * extra.len());
            for token in &out {
                for i in Interpolant::ALL {
                    prop_assert!(!token.contains(i.marker()));
                }
            }
        }

        #[test]
        fn resolution_is_deterministic(
            tpl in template(),
            extra in proptest::collection::vec(value(), 0..4),
        ) {
            let c = InterpolationContext { name: "n", tag: "t", file: Some("f"), extra_args: &extra };
            prop_assert_eq!(resolve_shell(&tpl, &c), resolve_shell(&tpl, &c));
            let tokens = vec![tpl.clone(), "{...}".to_string()];
            prop_assert_eq!(resolve_args(&tokens, &c), resolve_args(&tokens, &c));
        }
    }
}
