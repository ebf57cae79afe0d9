//! Separating gantry's own flags from arguments meant for the tasks

/// Long flags that take a value (`--stdin web` or `--stdin=web`)
const LONG_WITH_VALUE: &[&str] = &["--stdin", "--format", "--config", "--directory"];

/// Long flags without a value
const LONG_SWITCHES: &[&str] = &[
    "--no-root",
    "--watch",
    "--flags-last",
    "--dry-run",
    "--verbose",
    "--quiet",
    "--help",
    "--version",
];

/// Short flags without a value; `-C` is the only one that takes one
const SHORT_SWITCHES: &[char] = &['v', 'q', 'h', 'V'];

/// Split raw arguments (without the program name) into what clap should
/// parse and what is passed through to the tasks.
///
/// Known flags are recognised anywhere. An unknown `--flag` is passed
/// through, together with the next token unless that token starts with `-`.
/// Everything after a bare `--` is passed through as is.
pub fn split_passthrough<I, S>(args: I) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut own = Vec::new();
    let mut passthrough = Vec::new();
    let mut args = args.into_iter().map(Into::into).peekable();

    while let Some(arg) = args.next() {
        if arg == "--" {
            passthrough.extend(args.by_ref());
            break;
        }

        if let Some(body) = arg.strip_prefix("--") {
            let name_len = body.find('=').map_or(arg.len(), |i| i + 2);
            let name = &arg[..name_len];
            let inline_value = name_len < arg.len();

            if LONG_WITH_VALUE.contains(&name) {
                own.push(arg.clone());
                if !inline_value {
                    own.extend(args.next());
                }
            } else if LONG_SWITCHES.contains(&name) {
                own.push(arg);
            } else {
                passthrough.push(arg);
                if !inline_value {
                    if let Some(value) = args.next_if(|next| !next.starts_with('-')) {
                        passthrough.push(value);
                    }
                }
            }
            continue;
        }

        if let Some(shorts) = arg.strip_prefix('-').filter(|s| !s.is_empty()) {
            if shorts == "C" {
                own.push(arg);
                own.extend(args.next());
            } else if shorts.starts_with('C') || shorts.chars().all(|c| SHORT_SWITCHES.contains(&c)) {
                own.push(arg);
            } else {
                passthrough.push(arg);
            }
            continue;
        }

        own.push(arg);
    }

    (own, passthrough)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(args: &[&str]) -> (Vec<String>, Vec<String>) {
        split_passthrough(args.iter().copied())
    }

    #[test]
    fn test_plain_tasks() {
        let (own, pass) = split(&["dev", "build"]);
        assert_eq!(own, vec!["dev", "build"]);
        assert!(pass.is_empty());
    }

    #[test]
    fn test_known_flags_anywhere() {
        let (own, pass) = split(&["dev", "--watch", "--stdin", "web", "build", "--no-root"]);
        assert_eq!(own, vec!["dev", "--watch", "--stdin", "web", "build", "--no-root"]);
        assert!(pass.is_empty());
    }

    #[test]
    fn test_unknown_flag_takes_following_value() {
        let (own, pass) = split(&["dev", "--port", "3000", "--open"]);
        assert_eq!(own, vec!["dev"]);
        assert_eq!(pass, vec!["--port", "3000", "--open"]);
    }

    #[test]
    fn test_unknown_flag_does_not_take_another_flag() {
        let (own, pass) = split(&["test", "--coverage", "--watch"]);
        assert_eq!(own, vec!["test", "--watch"]);
        assert_eq!(pass, vec!["--coverage"]);
    }

    #[test]
    fn test_equals_form_is_one_token() {
        let (own, pass) = split(&["dev", "--mode=production", "web", "--stdin=api"]);
        assert_eq!(own, vec!["dev", "web", "--stdin=api"]);
        assert_eq!(pass, vec!["--mode=production"]);
    }

    #[test]
    fn test_double_dash_passes_everything() {
        let (own, pass) = split(&["dev", "--", "--watch", "x"]);
        assert_eq!(own, vec!["dev"]);
        assert_eq!(pass, vec!["--watch", "x"]);
    }

    #[test]
    fn test_short_flags() {
        let (own, pass) = split(&["-C", "app", "-vq", "dev", "-p", "-Cother"]);
        assert_eq!(own, vec!["-C", "app", "-vq", "dev", "-Cother"]);
        assert_eq!(pass, vec!["-p"]);
    }
}
