/// Prepares a message body for transmission after `DATA`.
///
/// Bare `\n` line endings become `\r\n`, lines starting with `.` are
/// dot-stuffed, and the terminating `.\r\n` is appended.
#[must_use]
pub fn encode_data(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 32 + 5);
    let mut line_start = true;
    let mut previous = 0u8;

    for &byte in data {
        match byte {
            b'\n' => {
                if previous != b'\r' {
                    out.push(b'\r');
                }
                out.push(b'\n');
                line_start = true;
            }
            b'.' if line_start => {
                out.extend_from_slice(b"..");
                line_start = false;
            }
            _ => {
                out.push(byte);
                line_start = false;
            }
        }
        previous = byte;
    }

    // A trailing bare CR is the start of the final line ending.
    if out.ends_with(b"\r") {
        out.push(b'\n');
    } else if !out.is_empty() && !out.ends_with(b"\r\n") {
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b".\r\n");
    out
}
