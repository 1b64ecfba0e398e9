//! Notification texts.

use std::time::Duration;

/// One email-shaped message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

/// `"<h> hours, <m> minutes, and <s> seconds"`, whole units.
#[must_use]
pub fn format_runtime(runtime: Duration) -> String {
    let total = runtime.as_secs();
    let hours = total / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    format!("{hours} hours, {minutes} minutes, and {seconds} seconds")
}

/// The destination was replaced with a fresh extract.
#[must_use]
pub fn success(prefix: &str, label: &str, runtime: Duration) -> Notification {
    Notification {
        subject: format!("{prefix} - Automated email: {label} Parcels Successfully Updated"),
        body: format!(
            "Parcels were successfully updated. Total runtime: {}.",
            format_runtime(runtime)
        ),
    }
}

/// The extract contained no parcels; the destination was left alone.
#[must_use]
pub fn empty_extract(prefix: &str, label: &str) -> Notification {
    Notification {
        subject: format!("{prefix} ERROR - Automated email: {label} parcel data is blank"),
        body: format!("The parcel data from {label} is blank. Please investigate."),
    }
}

/// The run failed. `error` is rendered with its whole source chain.
#[must_use]
pub fn failure(prefix: &str, error: &(dyn std::error::Error + 'static)) -> Notification {
    let mut body = String::from("There was an error, check the log file");
    body.push_str("\n\n");
    body.push_str(&error_chain(error));

    Notification {
        subject: format!("{prefix} - Automated email for error during parcel load"),
        body,
    }
}

/// `error` followed by each of its sources, one per line.
#[must_use]
pub fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        out.push_str("\n  caused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("load failed")]
    struct Outer(#[source] std::io::Error);

    #[test]
    fn runtime_is_split_into_units() {
        assert_eq!(
            format_runtime(Duration::from_secs(3_725)),
            "1 hours, 2 minutes, and 5 seconds"
        );
        assert_eq!(
            format_runtime(Duration::from_millis(59_900)),
            "0 hours, 0 minutes, and 59 seconds"
        );
    }

    #[test]
    fn success_message() {
        let n = success("PRODUCTION", "El Dorado County", Duration::from_secs(125));
        assert_eq!(
            n.subject,
            "PRODUCTION - Automated email: El Dorado County Parcels Successfully Updated"
        );
        assert_eq!(
            n.body,
            "Parcels were successfully updated. Total runtime: 0 hours, 2 minutes, and 5 seconds."
        );
    }

    #[test]
    fn empty_message() {
        let n = empty_extract("TEST", "EDC");
        assert_eq!(n.subject, "TEST ERROR - Automated email: EDC parcel data is blank");
        assert_eq!(n.body, "The parcel data from EDC is blank. Please investigate.");
    }

    #[test]
    fn failure_message_carries_error_chain() {
        let error = Outer(std::io::Error::other("disk full"));
        let n = failure("PRODUCTION", &error);
        assert_eq!(
            n.subject,
            "PRODUCTION - Automated email for error during parcel load"
        );
        assert!(n.body.starts_with("There was an error, check the log file"));
        assert!(n.body.contains("load failed\n  caused by: disk full"));
    }
}
