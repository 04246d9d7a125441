//! Tests for error conversions
//!
//! Checks that the From implementations let `?` carry foreign errors into
//! SeqcheckError with the expected variant.

use crate::db::DbFault;
use crate::error::SeqcheckError;

#[tokio::test]
async fn test_join_error_conversion() {
    async fn task_that_panics() -> Result<(), &'static str> {
        panic!("test panic");
    }

    async fn test_function() -> Result<(), SeqcheckError> {
        let handle = tokio::spawn(task_that_panics());
        let _result = handle.await?;
        Ok(())
    }

    let result = test_function().await;
    match result {
        Err(SeqcheckError::Internal { message }) => assert!(message.contains("Task panicked")),
        other => panic!("Expected Internal error with panic message, got {:?}", other),
    }
}

#[test]
fn test_db_fault_conversion_keeps_source() {
    fn test_function() -> Result<(), SeqcheckError> {
        Err::<(), DbFault>(DbFault::rollback("aborted"))?;
        Ok(())
    }

    match test_function() {
        Err(SeqcheckError::Database { source, .. }) => {
            assert_eq!(source, DbFault::rollback("aborted"));
        }
        other => panic!("Expected Database error, got {:?}", other),
    }
}

#[test]
fn test_toml_error_becomes_configuration_error() {
    fn test_function() -> Result<(), SeqcheckError> {
        let _: toml::Value = toml::from_str("this is = = not toml")?;
        Ok(())
    }

    assert!(matches!(
        test_function(),
        Err(SeqcheckError::ConfigurationError { component, .. }) if component == "config_file"
    ));
}

#[test]
fn test_fatal_errors() {
    let unclassified = SeqcheckError::UnclassifiedFault {
        process: 3,
        f: crate::history::Function::Write,
        key: 9,
        source: DbFault::sql("syntax error at or near \"inser\""),
    };
    assert!(unclassified.is_fatal());
    assert!(unclassified.to_string().contains("key 9 on process 3"));
    assert!(!SeqcheckError::configuration("workload", "bad").is_fatal());
}
