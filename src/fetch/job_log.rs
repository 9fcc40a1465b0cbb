//! Execution timestamps recovered from the JES message log.
//!
//! Older z/OSMF releases list jobs without `exec-started` / `exec-ended`.
//! Both can be read back from the JESMSGLG spool file: the first dated line
//! and the `STARTED` line give the start, the `JOB EXECUTION DATE` statistics
//! line and the `ENDED` line give the end.

use crate::api::{JobInfo, RemoteApi, JESMSGLG_SPOOL_ID};
use crate::connection::ConnectionConfig;
use crate::error::Result;
use rayon::prelude::*;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

const START_KEYWORD: &str = "STARTED";
const END_KEYWORD: &str = "ENDED";
const NOT_RUN_KEYWORD: &str = "JOB NOT RUN";
const EXEC_DATE_KEYWORD: &str = "JOB EXECUTION DATE";

fn date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // e.g. "20 JUN 2023"
    RE.get_or_init(|| Regex::new(r"[0-9]+\s[a-zA-Z]{3}\s[0-9]+").expect("date pattern is valid"))
}

fn time_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // e.g. "19.45.23"
    RE.get_or_init(|| Regex::new(r"[0-9]+\.[0-9]+\.[0-9]+").expect("time pattern is valid"))
}

fn find(re: &Regex, text: &str) -> Option<String> {
    re.find(text).map(|m| m.as_str().to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobTimestamps {
    pub started: Option<String>,
    pub ended: Option<String>,
}

fn join(date: Option<String>, time: Option<String>) -> Option<String> {
    match (date, time) {
        (None, None) => None,
        (date, time) => Some(
            format!("{} {}", date.unwrap_or_default(), time.unwrap_or_default())
                .trim()
                .to_string(),
        ),
    }
}

/// Parse start and end of `job_name` / `job_id` out of a JESMSGLG listing.
///
/// Returns `None` when the log carries no recognizable date or time.
pub fn parse_job_log(log: &str, job_name: &str, job_id: &str) -> Option<JobTimestamps> {
    let lines: Vec<&str> = log.lines().collect();

    let (mut start_date, mut start_time) = (None, None);
    for line in &lines {
        if start_date.is_none() && date_regex().is_match(line) {
            start_date = find(date_regex(), line);
            if start_time.is_none() && !job_id.is_empty() && line.contains(job_id) {
                start_time = find(time_regex(), line);
            }
        } else if start_time.is_none() && line.contains(job_name) && line.contains(START_KEYWORD) {
            start_time = find(time_regex(), line);
        } else if start_date.is_some() && start_time.is_some() {
            break;
        }
    }

    let (mut end_date, mut end_time) = (None, None);
    for line in lines.iter().rev() {
        if end_date.is_none() {
            if let Some((before, _)) = line.split_once(EXEC_DATE_KEYWORD) {
                end_date = find(date_regex(), before);
                continue;
            }
        }
        if end_time.is_none()
            && line.contains(job_name)
            && (line.contains(END_KEYWORD) || line.contains(NOT_RUN_KEYWORD))
        {
            end_time = find(time_regex(), line);
        }
        if end_date.is_some() && end_time.is_some() {
            break;
        }
    }

    if end_date.is_none() && end_time.is_some() {
        end_date = start_date.clone();
    }
    if start_date.is_none() && start_time.is_none() && end_date.is_none() && end_time.is_none() {
        return None;
    }
    Some(JobTimestamps {
        started: join(start_date, start_time),
        ended: join(end_date, end_time),
    })
}

fn read_job_log(api: &dyn RemoteApi, conn: &ConnectionConfig, job: &JobInfo) -> Result<String> {
    let head = format!("Cannot fetch the job log of {}/{}", job.job_name, job.job_id);
    let bytes = api
        .retrieve_spool_file_content(conn, &job.job_name, &job.job_id, JESMSGLG_SPOOL_ID)?
        .into_body(&head)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Fill missing execution timestamps of `jobs` from their job logs.
///
/// Logs are fetched in parallel. A job whose log cannot be read or parsed is
/// kept as listed.
pub fn fill_exec_timestamps(
    api: &dyn RemoteApi,
    conn: &ConnectionConfig,
    jobs: Vec<JobInfo>,
) -> Vec<JobInfo> {
    jobs.into_par_iter()
        .map(|mut job| {
            if job.has_exec_timestamps() {
                return job;
            }
            match read_job_log(api, conn, &job) {
                Ok(log) => {
                    if let Some(stamps) = parse_job_log(&log, &job.job_name, &job.job_id) {
                        job.exec_started = stamps.started.or(job.exec_started);
                        job.exec_ended = stamps.ended.or(job.exec_ended);
                    }
                }
                Err(e) => debug!(job = %job.job_id, error = %e, "job log unavailable"),
            }
            job
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "J E S 2  J O B  L O G  --  S Y S T E M  S 0 W 1  --  N O D E  S 0 W 1\n\
0\n\
19.45.23 TSU06062 ---- TUESDAY,   20 JUN 2023 ----\n\
19.45.23 TSU06062  HASP373 TESTJOB  STARTED\n\
19.45.23 TSU06062  IEF125I TESTJOB - LOGGED ON - TIME=19.45.23\n\
20.09.28 TSU06062  BPXP018I THREAD 2037180000000000, IN PROCESS 83952040, ENDED  856\n\
20.09.29 TSU06062  HASP395 TESTJOB  ENDED - ABEND=S222\n\
0------ JES2 JOB STATISTICS ------\n\
-  20 JUN 2023 JOB EXECUTION DATE\n\
    -            3 CARDS READ\n\
    -        24.09 MINUTES EXECUTION TIME";

    #[test]
    fn test_parse_start_and_end() {
        let stamps = parse_job_log(LOG, "TESTJOB", "TSU06062").unwrap();
        assert_eq!(stamps.started.as_deref(), Some("20 JUN 2023 19.45.23"));
        assert_eq!(stamps.ended.as_deref(), Some("20 JUN 2023 20.09.29"));
    }

    #[test]
    fn test_end_date_falls_back_to_start_date() {
        let log = LOG.replace("JOB EXECUTION DATE", "JOB");
        let stamps = parse_job_log(&log, "TESTJOB", "TSU06062").unwrap();
        assert_eq!(stamps.ended.as_deref(), Some("20 JUN 2023 20.09.29"));
    }

    #[test]
    fn test_unparseable_log() {
        assert_eq!(parse_job_log("nothing to see\n", "TESTJOB", "JOB00001"), None);
        assert_eq!(parse_job_log("", "TESTJOB", "JOB00001"), None);
    }
}
