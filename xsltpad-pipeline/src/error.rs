use std::error::Error;

/// The message of the last error in a `source` chain.
pub fn innermost_message(error: &(dyn Error + 'static)) -> String {
    let mut current = error;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string()
}

/// Every message in a `source` chain, joined with `": "`.
pub fn message_chain(error: &(dyn Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut current = error;
    while let Some(source) = current.source() {
        message.push_str(": ");
        message.push_str(&source.to_string());
        current = source;
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    enum Outer {
        #[error("outer")]
        Wrapped(#[source] Inner),
        #[error("alone")]
        Alone,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("inner cause")]
    struct Inner;

    #[test]
    fn test_innermost() {
        assert_eq!(innermost_message(&Outer::Wrapped(Inner)), "inner cause");
        assert_eq!(innermost_message(&Outer::Alone), "alone");
    }

    #[test]
    fn test_chain() {
        assert_eq!(message_chain(&Outer::Wrapped(Inner)), "outer: inner cause");
    }
}
