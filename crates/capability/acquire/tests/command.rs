use domain::AcquireStatus;
use mbus_acquire::{AcquireError, SerialRequestCommand, SerialRequestConfig, TelegramSource};

fn config(command: &str) -> SerialRequestConfig {
    SerialRequestConfig {
        command: command.to_string(),
        baud_rate: 2400,
        device: "/dev/ttyUSB0".to_string(),
        meter_address: 1,
    }
}

// echo 回显参数列表，验证旗标与参数顺序（-b {baud} {device} {address}）。
#[tokio::test]
async fn command_argument_order() {
    let source = SerialRequestCommand::new(config("echo"));
    let telegram = source.fetch().await.expect("fetch");
    assert!(telegram.status.is_success());
    let stdout = String::from_utf8(telegram.payload).expect("utf8");
    assert_eq!(stdout.trim_end(), "-b 2400 /dev/ttyUSB0 1");
}

#[tokio::test]
async fn nonzero_exit_reported_as_failed_status() {
    let source = SerialRequestCommand::new(config("false"));
    let telegram = source.fetch().await.expect("fetch");
    assert!(matches!(telegram.status, AcquireStatus::Failed(Some(1))));
}

#[tokio::test]
async fn missing_binary_is_invoke_error() {
    let source = SerialRequestCommand::new(config("/nonexistent/mbus-serial-request-data"));
    let err = source.fetch().await.expect_err("invoke failure");
    assert!(matches!(err, AcquireError::Invoke(_, _)));
}
