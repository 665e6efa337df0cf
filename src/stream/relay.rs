//! Plain relay for custom-script output. No filtering, no decoding.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use super::ParsedStream;

/// Relay every line and accumulate the lot.
pub async fn parse_plain<R, F>(reader: R, mut on_line: F) -> ParsedStream
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut lines = BufReader::new(reader).lines();
    let mut output = String::new();
    let mut error = None;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error = Some(e);
                break;
            }
        };
        on_line(&line);
        output.push_str(&line);
        output.push('\n');
    }

    ParsedStream::finish(output, error)
}
