//! Conversion of panics escaping a provider into `Error::Unexpected`.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::error;

use polystore_common::{Error, Result};

/// Run `operation`, turning a panic inside it into an `Unexpected` error.
pub(crate) async fn guarded<T, F>(name: &'static str, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(operation).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(operation = name, %message, "Operation aborted by unexpected fault");
            Err(Error::Unexpected(format!("{} failed: {}", name, message)))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_results_through() {
        let ok: Result<u8> = guarded("ok", async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err: Result<u8> = guarded("err", async { Err(Error::NotFound("x".into())) }).await;
        assert!(matches!(err, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_converts_panics() {
        let result: Result<u8> = guarded("boom", async {
            if true {
                panic!("disk on fire");
            }
            Ok(0)
        })
        .await;
        match result {
            Err(Error::Unexpected(message)) => assert!(message.contains("disk on fire")),
            other => panic!("expected unexpected error, got {:?}", other),
        }
    }
}
