//! Asking the operator before anything is touched
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

pub const CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);

const AFFIRMATIVE: &str = "yes";

/// Trims, strips diacritics and lower-cases `answer` before comparing it to
/// the affirmative token, so `Yes`, `YES` and `yés` all count.
pub fn is_affirmative(answer: &str) -> bool {
    let folded: String = answer
        .trim()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect();
    folded == AFFIRMATIVE
}

/// Prints `prompt` and waits at most `timeout` for one line from `input`.
/// End of input, a read error and silence all count as a refusal. The reader
/// thread is left behind on timeout; it dies with the process.
pub fn confirm<R>(prompt: &str, input: R, timeout: Duration) -> bool
where
    R: BufRead + Send + 'static,
{
    print!("{prompt} Type '{AFFIRMATIVE}' to continue: ");
    if let Err(err) = io::stdout().flush() {
        tracing::debug!(%err, "could not flush prompt");
    }

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut input = input;
        let mut line = String::new();
        let answer = match input.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line),
            Err(err) => {
                tracing::warn!(%err, "failed to read confirmation");
                None
            }
        };
        // the receiver is gone once the prompt timed out
        let _ = tx.send(answer);
    });

    match rx.recv_timeout(timeout) {
        Ok(Some(answer)) => is_affirmative(&answer),
        Ok(None) | Err(RecvTimeoutError::Disconnected) => {
            tracing::warn!("no answer on standard input");
            false
        }
        Err(RecvTimeoutError::Timeout) => {
            tracing::warn!(?timeout, "no answer before the timeout");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufReader, Cursor, Read};

    use super::*;

    struct SlowReader(Duration);

    impl Read for SlowReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            thread::sleep(self.0);
            let answer = b"yes\n";
            let n = answer.len().min(buf.len());
            buf[..n].copy_from_slice(&answer[..n]);
            Ok(n)
        }
    }

    #[test]
    fn test_is_affirmative() {
        assert!(is_affirmative("yes"));
        assert!(is_affirmative("  YES \n"));
        assert!(is_affirmative("Yés"));
        assert!(is_affirmative("ÿes"));
        assert!(!is_affirmative("y"));
        assert!(!is_affirmative("yes please"));
        assert!(!is_affirmative(""));
    }

    #[test]
    fn test_confirm_reads_one_line() {
        let input = Cursor::new("YES\nno\n");
        assert!(confirm("restore?", input, Duration::from_secs(5)));

        let input = Cursor::new("no\nyes\n");
        assert!(!confirm("restore?", input, Duration::from_secs(5)));
    }

    #[test]
    fn test_confirm_eof_is_refusal() {
        assert!(!confirm("restore?", Cursor::new(""), Duration::from_secs(5)));
    }

    #[test]
    fn test_confirm_times_out() {
        let input = BufReader::new(SlowReader(Duration::from_millis(500)));
        assert!(!confirm("restore?", input, Duration::from_millis(20)));
    }
}
