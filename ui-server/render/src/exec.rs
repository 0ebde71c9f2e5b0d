//! `kubectl exec` shortcuts.

/// Builds the `kubectl exec` invocation for a target such as `web-0` or `svc/web`.
///
/// A `sh -c <script>` style command has its script single-quoted as one argument; other
/// arguments are quoted only when they contain whitespace or quotes.
pub fn kubectl_command(
    namespace: &str,
    target: &str,
    container: Option<&str>,
    command: &[String],
) -> String {
    let mut out = String::from("kubectl exec -it");
    if !namespace.is_empty() {
        out.push_str(" -n ");
        out.push_str(namespace);
    }
    out.push(' ');
    out.push_str(target);
    if let Some(c) = container.filter(|c| !c.is_empty()) {
        out.push_str(" -c ");
        out.push_str(c);
    }
    out.push_str(" --");

    match command {
        [shell, flag, script] if is_shell(shell) && flag == "-c" => {
            out.push_str(&format!(" {shell} -c {}", single_quote(script)));
        }
        args => {
            for arg in args {
                out.push(' ');
                let needs_quotes =
                    arg.contains(|c: char| c.is_whitespace() || c == '\'' || c == '"');
                if arg.is_empty() || needs_quotes {
                    out.push_str(&single_quote(arg));
                } else {
                    out.push_str(arg);
                }
            }
        }
    }
    out
}

fn is_shell(cmd: &str) -> bool {
    let name = cmd.rsplit('/').next().unwrap_or(cmd);
    matches!(name, "sh" | "bash" | "ash" | "zsh")
}

fn single_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
