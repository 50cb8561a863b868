//! Unsolicited lines: classification, ordering, and deferred side effects.

use std::sync::{Arc, Mutex};

use bgxx::at::{RegDomain, RegistrationStatus};
use bgxx::error::Error;
use bgxx::modem::SmsMessage;

use crate::mock_modem::{connected_socket, modem};

const LISTING: &str = "\r\n+CMGL: 3,\"REC UNREAD\",\"+351912345678\",,\"26/10/16,08:00:00+04\"\r\n\
                       hello there\r\n\r\nOK\r\n";

fn sms_sink() -> (Arc<Mutex<Vec<SmsMessage>>>, bgxx::modem::SmsHandler) {
    let got = Arc::new(Mutex::new(Vec::new()));
    let sink = got.clone();
    (got, Box::new(move |msg: &SmsMessage| sink.lock().unwrap().push(msg.clone())))
}

#[test]
fn registration_reports_update_every_domain() {
    let (mut m, script) = modem();
    script.push("\r\n+CREG: 1,\"1A2B\",\"01A2B3C\",9\r\n+CGREG: 2\r\n+CEREG: 3\r\n");

    m.service();

    assert_eq!(m.registration(RegDomain::Cs), RegistrationStatus::Registered);
    assert_eq!(m.registration(RegDomain::Gprs), RegistrationStatus::Searching);
    assert_eq!(m.registration(RegDomain::Lte), RegistrationStatus::Denied);
}

#[test]
fn unknown_lines_are_ignored() {
    let (mut m, script) = modem();
    script.push("\r\n+QIND: \"FOTA\",\"START\"\r\nNORMAL POWER DOWN\r\n\r\n");

    m.service();

    assert!(script.commands().is_empty());
}

#[test]
fn partial_lines_wait_for_their_terminator() {
    let (mut m, script) = modem();
    script.push("\r\n+CEREG: ");
    m.service();
    assert_eq!(m.registration(RegDomain::Lte), RegistrationStatus::Unknown);

    script.push("5\r\n");
    m.service();
    assert_eq!(m.registration(RegDomain::Lte), RegistrationStatus::Roaming);
}

#[test]
fn side_effects_wait_for_the_transaction_to_finish() {
    let (mut m, script) = connected_socket(1);
    script
        .on(
            "AT+CSQ",
            "\r\n+QIURC: \"closed\",1\r\n+CSQ: 20,99\r\n\r\nOK\r\n",
        )
        .on("AT+QICLOSE=1", "\r\nOK\r\n");

    let csq = m.query("AT+CSQ", "+CSQ: ", 500).unwrap();

    assert_eq!(csq, "20,99");
    assert_eq!(script.commands(), ["AT+CSQ", "AT+QICLOSE=1"]);
    assert!(!m.tcp_connected(1));
}

#[test]
fn events_before_the_terminal_line_are_applied_first() {
    let (mut m, script) = modem();
    script.on(
        "AT+QIACT?",
        "\r\n+QIACT: 2,1,1,\"10.1.1.1\"\r\n+CEREG: 1\r\n\r\nOK\r\n",
    );

    let lines = m.exec("AT+QIACT?", 500).unwrap();

    assert!(lines.is_empty());
    assert_eq!(m.context_ip(2), Some("10.1.1.1"));
    assert_eq!(m.registration(RegDomain::Lte), RegistrationStatus::Registered);
}

#[test]
fn unsolicited_traffic_cannot_outlast_the_timeout() {
    let (mut m, script) = modem();
    script.on("AT+CSQ", &"\r\n+CEREG: 1\r\n".repeat(200));
    script.trickle(1);

    assert_eq!(
        m.query("AT+CSQ", "+CSQ: ", 500),
        Err(Error::At(bgxx::error::AtError::Timeout))
    );
    assert!(script.now_ms() < 1_000);
    assert_eq!(m.registration(RegDomain::Lte), RegistrationStatus::Registered);
}

#[test]
fn cme_error_ends_any_transaction() {
    let (mut m, script) = modem();
    script.on("AT+QCCID", "\r\n+CME ERROR: 10\r\n");
    assert_eq!(
        m.query("AT+QCCID", "+QCCID: ", 500),
        Err(Error::At(bgxx::error::AtError::Cme(10)))
    );
}

#[test]
fn sms_notification_lists_and_delivers() {
    let (mut m, script) = modem();
    let (got, handler) = sms_sink();
    m.set_sms_handler(handler).unwrap();
    script.on("AT+CMGL=\"ALL\"", LISTING);
    script.push("\r\n+CMTI: \"ME\",3\r\n");

    m.service();

    let got = got.lock().unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].index, 3);
    assert_eq!(got[0].origin.as_str(), "+351912345678");
    assert_eq!(got[0].text.as_str(), "hello there");
}

#[test]
fn repeated_notifications_list_once() {
    let (mut m, script) = modem();
    let (got, handler) = sms_sink();
    m.set_sms_handler(handler).unwrap();
    script
        .on(
            "AT+CSQ",
            "\r\n+CMTI: \"ME\",3\r\n+CMTI: \"ME\",4\r\n+CSQ: 20,99\r\n\r\nOK\r\n",
        )
        .on("AT+CMGL=\"ALL\"", LISTING);

    m.query("AT+CSQ", "+CSQ: ", 500).unwrap();

    assert_eq!(script.commands(), ["AT+CSQ", "AT+CMGL=\"ALL\""]);
    assert_eq!(got.lock().unwrap().len(), 1);
}

#[test]
fn sms_without_handler_is_not_listed() {
    let (mut m, script) = modem();
    script.push("\r\n+CMTI: \"SM\",1\r\n");
    m.service();
    assert!(script.commands().is_empty());
}

#[test]
fn only_one_sms_handler() {
    let (mut m, _) = modem();
    let (_, first) = sms_sink();
    let (_, second) = sms_sink();
    m.set_sms_handler(first).unwrap();
    assert_eq!(m.set_sms_handler(second), Err(Error::HandlerAlreadySet));

    m.clear_sms_handler();
    assert!(!m.has_sms_handler());
    let (_, third) = sms_sink();
    m.set_sms_handler(third).unwrap();
}

#[test]
fn open_confirmation_for_an_unknown_socket_is_harmless() {
    let (mut m, script) = modem();
    script.push("\r\n+QIOPEN: 11,0\r\n+QIURC: \"recv\",9\r\n");
    m.service();
    assert!(script.commands().is_empty());
}
