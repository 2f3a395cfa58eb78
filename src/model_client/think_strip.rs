//! Strips `<think>...</think>` reasoning-trace spans some models emit.
//! Works as a filter applied to the accumulated final string so a single
//! span can't be split across chunk boundaries.

/// Remove every `<think>...</think>` span, including unterminated ones that
/// run to the end of the string (a model that never closes the tag should
/// not leak its scratch reasoning into downstream parsers).
pub fn strip_think_spans(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        match rest.find("<think>") {
            None => {
                out.push_str(rest);
                break;
            }
            Some(start) => {
                out.push_str(&rest[..start]);
                let after_open = &rest[start + "<think>".len()..];
                match after_open.find("</think>") {
                    Some(end) => {
                        rest = &after_open[end + "</think>".len()..];
                    }
                    None => break, // unterminated: drop to end of string
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_single_span() {
        let out = strip_think_spans("<think>scratch</think>hello");
        assert_eq!(out, "hello");
    }

    #[test]
    fn strips_multiple_spans() {
        let out = strip_think_spans("a<think>x</think>b<think>y</think>c");
        assert_eq!(out, "abc");
    }

    #[test]
    fn drops_unterminated_span() {
        let out = strip_think_spans("before<think>never closes");
        assert_eq!(out, "before");
    }

    #[test]
    fn passthrough_when_absent() {
        let out = strip_think_spans("plain text");
        assert_eq!(out, "plain text");
    }
}
