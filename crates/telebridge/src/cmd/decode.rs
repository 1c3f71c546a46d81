use std::io::{self, IsTerminal};

use telebridge_frame::{FrameError, LineReader};
use telebridge_protocol::Decoder;

use crate::cmd::DecodeArgs;
use crate::exit::{io_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_decoded, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let decoder = Decoder::new();

    if !args.lines.is_empty() {
        for line in args.lines.iter().map(|line| line.trim()).filter(|l| !l.is_empty()) {
            print_decoded(line, &decoder.decode(line), format);
        }
        return Ok(SUCCESS);
    }

    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Err(CliError::new(USAGE, "no lines given and stdin is a terminal"));
    }

    // Same framing as the device link, so overflow and blank-line rules match.
    let mut reader = LineReader::new(stdin.lock());
    for record in reader.lines() {
        match record {
            Ok(record) => print_decoded(record.text(), &decoder.decode(record.text()), format),
            Err(FrameError::LineTooLong { size, max }) => {
                tracing::warn!(size, max, "skipping oversized line");
            }
            Err(FrameError::Io(err)) => return Err(io_error("failed reading stdin", err)),
            Err(err) => return Err(CliError::new(USAGE, err.to_string())),
        }
    }
    Ok(SUCCESS)
}
