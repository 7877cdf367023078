//! Formatting for panics caught in decode workers.
//!
//! A decoder bug must not take a worker down with it, so workers catch
//! unwinds and log the payload through [`format_panic`].

use std::{any::Any, fmt};

/// Borrowed panic payload that renders as the panic message.
///
/// String payloads print as-is; anything else prints a placeholder.
///
/// ```
/// use streamtap::panic::format_panic;
///
/// let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
/// assert_eq!(format_panic(payload.as_ref()).to_string(), "boom");
///
/// let payload: Box<dyn std::any::Any + Send> = Box::new(7_u8);
/// assert_eq!(format_panic(payload.as_ref()).to_string(), "<non-string panic>");
/// ```
#[derive(Clone, Copy)]
#[must_use]
pub struct PanicMessage<'a>(&'a (dyn Any + Send));

impl fmt::Display for PanicMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .0
            .downcast_ref::<&'static str>()
            .copied()
            .or_else(|| self.0.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("<non-string panic>");
        f.write_str(text)
    }
}

impl fmt::Debug for PanicMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PanicMessage").field(&self.to_string()).finish()
    }
}

/// Wrap a caught panic payload for display.
pub fn format_panic(payload: &(dyn Any + Send)) -> PanicMessage<'_> { PanicMessage(payload) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_payload_from_panic_macro() {
        let result: std::thread::Result<()> =
            std::panic::catch_unwind(|| panic!("decoder exploded on {}", 3));
        let payload = result.expect_err("closure panics");
        assert_eq!(format_panic(payload.as_ref()).to_string(), "decoder exploded on 3");
    }

    #[test]
    fn debug_includes_message() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("bad"));
        assert_eq!(
            format!("{:?}", format_panic(payload.as_ref())),
            "PanicMessage(\"bad\")"
        );
    }
}
