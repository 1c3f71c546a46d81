use telebridge_audit::{clamp_limit, AuditSink, SqliteAuditSink, MAX_QUERY_LIMIT};

use crate::cmd::LogsArgs;
use crate::exit::{audit_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_records, OutputFormat};

pub fn run(args: LogsArgs, format: OutputFormat) -> CliResult<i32> {
    if args.limit == 0 || args.limit > MAX_QUERY_LIMIT {
        return Err(CliError::new(
            USAGE,
            format!("--limit must be between 1 and {MAX_QUERY_LIMIT}"),
        ));
    }
    if !args.audit.audit_path.exists() {
        return Err(CliError::new(
            USAGE,
            format!("no audit store at {}", args.audit.audit_path.display()),
        ));
    }

    let sink = SqliteAuditSink::open(&args.audit.audit_path)
        .map_err(|err| audit_error("failed to open audit store", err))?;
    let records = sink
        .query(clamp_limit(args.limit))
        .map_err(|err| audit_error("audit query failed", err))?;

    print_records(&records, format);
    Ok(SUCCESS)
}
