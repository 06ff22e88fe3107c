use crate::error::ValidationError;

use super::models::Record;

/// 检查四个必填字段均非空；一次性报告所有缺失字段
pub fn validate(record: &Record) -> Result<(), ValidationError> {
    let fields = [
        ("app_name", &record.app_name),
        ("job_name", &record.job_name),
        ("version", &record.version),
        ("build_number", &record.build_number),
    ];
    let missing: Vec<&'static str> = fields
        .iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| *name)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { missing })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> Record {
        Record {
            app_name: "svc".into(),
            job_name: "build".into(),
            version: "1.0.0".into(),
            build_number: "42".into(),
        }
    }

    #[test]
    fn complete_record_passes() {
        assert!(validate(&full()).is_ok());
    }

    #[test]
    fn missing_version_is_reported() {
        let record = Record {
            version: String::new(),
            ..full()
        };
        let err = validate(&record).unwrap_err();
        assert_eq!(err.missing, vec!["version"]);
    }

    #[test]
    fn all_missing_fields_are_reported_in_order() {
        let err = validate(&Record::default()).unwrap_err();
        assert_eq!(
            err.missing,
            vec!["app_name", "job_name", "version", "build_number"]
        );
    }

    #[test]
    fn whitespace_counts_as_present() {
        let record = Record {
            job_name: " ".into(),
            ..full()
        };
        assert!(validate(&record).is_ok());
    }
}
