//! Boot, base configuration, radio selection, PDP contexts and upkeep.

use bgxx::at::{RegDomain, RegistrationStatus};
use bgxx::error::{AtError, ContextError, Error};
use bgxx::modem::{ErrorFormat, RadioMode, Technology};

use crate::mock_modem::{MockPowerKey, Script, attached_modem, modem};

fn script_configure(script: &Script) {
    script
        .on("ATE0", "\r\nOK\r\n")
        .on("AT+CREG=2", "\r\nOK\r\n")
        .on("AT+CGSN", "\r\n866425031234567\r\n\r\nOK\r\n")
        .on("AT+CSCS=\"IRA\"", "\r\nOK\r\n")
        .on("AT+CMGF=1", "\r\nOK\r\n")
        .on("AT+QCCID", "\r\n+QCCID: 89351060000000000001\r\n\r\nOK\r\n")
        .on("AT+CIMI", "\r\n268011234567890\r\n\r\nOK\r\n");
}

// ── Boot ──────────────────────────────────────────────────────

#[test]
fn init_boots_and_reads_identity() {
    let (mut m, script) = modem();
    let mut key = MockPowerKey::new(&script);
    script_configure(&script);

    m.init(&mut key).unwrap();

    assert_eq!(key.pulses, vec![2_000]);
    assert_eq!(m.imei(), "866425031234567");
    assert_eq!(m.ccid(), "89351060000000000001");
    assert_eq!(m.imsi(), "268011234567890");
    assert_eq!(script.remaining(), 0);
}

#[test]
fn silent_module_fails_after_one_retry() {
    let (mut m, script) = modem();
    let mut key = MockPowerKey::new(&script);
    key.banners = false;

    assert_eq!(
        m.power_cycle(&mut key),
        Err(Error::Init("module did not boot"))
    );
    assert_eq!(key.pulses.len(), 2);
}

#[test]
fn missing_sim_fails_configure() {
    let (mut m, script) = modem();
    script
        .on("ATE0", "\r\nOK\r\n")
        .on("AT+CREG=2", "\r\nOK\r\n")
        .on("AT+CGSN", "\r\n866425031234567\r\n\r\nOK\r\n")
        .on("AT+CSCS=\"IRA\"", "\r\nOK\r\n")
        .on("AT+CMGF=1", "\r\nOK\r\n")
        .on("AT+QCCID", "\r\nOK\r\n");

    assert_eq!(m.configure(), Err(Error::Init("no SIM card")));
    assert!(!script.sent("AT+CIMI"));
}

#[test]
fn reboot_forgets_connections_but_keeps_the_apn() {
    let (mut m, script) = attached_modem();
    let mut key = MockPowerKey::new(&script);
    assert!(m.context_connected(1));

    m.power_cycle(&mut key).unwrap();

    assert!(!m.context_connected(1));
    assert_eq!(m.context_ip(1), None);
    assert_eq!(
        m.registry()
            .context(bgxx::registry::ContextId::new(1).unwrap())
            .apn(),
        "internet"
    );
}

// ── Radio ─────────────────────────────────────────────────────

#[test]
fn radio_mode_without_operator_changes_scan_config() {
    let (mut m, script) = modem();
    script
        .on("AT+QCFG=\"iotopmode\",0,1", "\r\nOK\r\n")
        .on("AT+QCFG=\"nwscanmode\",0,1", "\r\nOK\r\n");
    m.configure_radio_mode(RadioMode::CatM1, None, false).unwrap();

    script.on("AT+QCFG=\"nwscanmode\",1,1", "\r\nOK\r\n");
    m.configure_radio_mode(RadioMode::Gsm, None, false).unwrap();

    assert_eq!(script.remaining(), 0);
    assert!(!script.sent("AT+QCFG=\"iotopmode\",2,1"));
}

#[test]
fn radio_mode_with_operator_selects_the_network() {
    let (mut m, script) = modem();
    script.on("AT+COPS=1,2,\"26801\",9", "\r\nOK\r\n");
    m.configure_radio_mode(RadioMode::NbIot, Some(26801), true)
        .unwrap();

    script.on("AT+COPS=4,2,\"26801\"", "\r\nOK\r\n");
    m.configure_radio_mode(RadioMode::Auto, Some(26801), false)
        .unwrap();
    assert_eq!(script.remaining(), 0);
}

#[test]
fn error_format_and_tls_profile() {
    let (mut m, script) = modem();
    script
        .on("AT+CMEE=1", "\r\nOK\r\n")
        .on("AT+QSSLCFG=\"sslversion\",2,4", "\r\nOK\r\n")
        .on("AT+QSSLCFG=\"ciphersuite\",2,0XFFFF", "\r\nOK\r\n")
        .on("AT+QSSLCFG=\"seclevel\",2,0", "\r\nOK\r\n")
        .on("AT+QSSLCFG=\"sni\",2,1", "\r\nOK\r\n")
        .on("AT+QSSLCFG=\"cacert\",2,\"cacert.pem\"", "\r\nOK\r\n");

    m.set_error_message_format(ErrorFormat::Numeric).unwrap();
    m.set_tls_profile(2).unwrap();

    assert_eq!(script.remaining(), 0);
    assert!(m.set_tls_profile(6).is_err());
}

#[test]
fn ready_answer_is_cached() {
    let (mut m, script) = modem();
    script.on("AT", "\r\nOK\r\n");
    assert!(m.ready());
    assert!(m.ready());
    assert_eq!(script.commands(), ["AT"]);

    script.advance(3_000);
    assert!(!m.ready());
    assert_eq!(script.commands().len(), 2);
}

#[test]
fn rssi_reads_technology_and_caches() {
    let (mut m, script) = modem();
    script.on(
        "AT+QCSQ",
        "\r\n+QCSQ: \"eMTC\",-75,-103,120,-10\r\n\r\nOK\r\n",
    );

    assert_eq!(m.rssi(), Ok(-75));
    assert_eq!(m.technology(), Technology::EMtc);
    assert_eq!(m.rssi(), Ok(-75));
    assert_eq!(script.commands(), ["AT+QCSQ"]);
}

#[test]
fn radio_off_drops_registration() {
    let (mut m, script) = attached_modem();
    script.push("\r\n+CEREG: 1\r\n");
    m.service();
    assert_eq!(m.registration(RegDomain::Lte), RegistrationStatus::Registered);

    script.on("AT+CFUN=0", "\r\nOK\r\n");
    m.radio_off().unwrap();

    assert_eq!(m.registration(RegDomain::Lte), RegistrationStatus::Unknown);
    assert!(!m.context_connected(1));
}

// ── PDP contexts ──────────────────────────────────────────────

#[test]
fn activation_reads_the_address_from_the_report() {
    let (m, _) = attached_modem();
    assert!(m.context_connected(1));
    assert_eq!(m.context_ip(1), Some("10.0.0.2"));
    assert_eq!(m.context_retry_delay(1), 0);
}

#[test]
fn failed_activation_backs_off() {
    let (mut m, script) = modem();
    script
        .on("AT+QICSGP=1,1,\"internet\",\"\",\"\",0", "\r\nOK\r\n")
        .on("AT+QIACT=1", "\r\nERROR\r\n")
        .on("AT+QIDEACT=1", "\r\nOK\r\n")
        .on("AT+QIACT=1", "\r\n+CME ERROR: 30\r\n")
        .on("AT+QIDEACT=1", "\r\nOK\r\n");
    m.setup_context(1, "internet").unwrap();

    assert_eq!(
        m.open_pdp_context(1),
        Err(Error::Context(ContextError::ActivationFailed))
    );
    assert_eq!(m.context_retry_delay(1), 30_000);

    assert!(m.open_pdp_context(1).is_err());
    assert_eq!(m.context_retry_delay(1), 60_000);
    assert_eq!(script.remaining(), 0);
}

#[test]
fn activation_without_a_report_backs_off() {
    let (mut m, script) = modem();
    script
        .on("AT+QICSGP=1,1,\"internet\",\"\",\"\",0", "\r\nOK\r\n")
        .on("AT+QIACT=1", "\r\nOK\r\n")
        .on("AT+QIACT?", "\r\nOK\r\n")
        .on("AT+QIDEACT=1", "\r\nOK\r\n");
    m.setup_context(1, "internet").unwrap();

    assert_eq!(
        m.open_pdp_context(1),
        Err(Error::Context(ContextError::NotConnected))
    );
    assert_eq!(m.context_retry_delay(1), 30_000);
    assert!(script.sent("AT+QIDEACT=1"));
    assert_eq!(script.remaining(), 0);
}

#[test]
fn activation_is_refused_without_service() {
    let (mut m, script) = modem();
    script.on("AT+QCSQ", "\r\n+QCSQ: \"NOSERVICE\"\r\n\r\nOK\r\n");
    m.rssi().unwrap();
    script.clear_log();

    assert_eq!(
        m.open_pdp_context(1),
        Err(Error::Context(ContextError::NoService))
    );
    assert!(script.commands().is_empty());
}

#[test]
fn already_connected_context_is_not_reactivated() {
    let (mut m, script) = attached_modem();
    m.open_pdp_context(1).unwrap();
    assert!(script.commands().is_empty());
}

#[test]
fn close_and_network_deactivation() {
    let (mut m, script) = attached_modem();
    script.on("AT+QIDEACT=1", "\r\nOK\r\n");
    m.close_pdp_context(1).unwrap();
    assert!(!m.context_connected(1));

    let (mut m, script) = attached_modem();
    script.push("\r\n+QIURC: \"pdpdeact\",1\r\n");
    m.service();
    assert!(!m.context_connected(1));
}

#[test]
fn address_query() {
    let (mut m, script) = attached_modem();
    script.on("AT+CGPADDR=1", "\r\n+CGPADDR: 1,\"10.0.0.2\"\r\n\r\nOK\r\n");
    assert_eq!(m.query_ip(1).unwrap().as_str(), "10.0.0.2");

    script.on("AT+CGPADDR=1", "\r\nOK\r\n");
    assert_eq!(m.query_ip(1), Err(Error::At(AtError::Unexpected)));
}

#[test]
fn invalid_context_ids_are_rejected() {
    let (mut m, script) = modem();
    assert!(m.setup_context(0, "internet").is_err());
    assert!(m.open_pdp_context(17).is_err());
    assert!(!m.context_connected(0));
    assert!(script.commands().is_empty());
}

// ── Maintenance ───────────────────────────────────────────────

#[test]
fn poll_runs_maintenance_when_due() {
    let (mut m, script) = modem();
    script
        .on("AT+CREG?", "\r\n+CREG: 2,5\r\n\r\nOK\r\n")
        .on("AT+QIACT?", "\r\n+QIACT: 1,1,1,\"10.0.0.7\"\r\n\r\nOK\r\n")
        .on("AT+QCSQ", "\r\n+QCSQ: \"NBIoT\",-90,-110,80,-12\r\n\r\nOK\r\n")
        .on(
            "AT+QNTP=1,\"pool.ntp.org\",123",
            "\r\nOK\r\n\r\n+QNTP: 0,\"2026/10/16,08:00:00+00\"\r\n",
        );

    m.poll();
    assert!(script.commands().is_empty());

    script.advance(30_000);
    m.poll();

    assert_eq!(script.remaining(), 0);
    assert_eq!(m.registration(RegDomain::Cs), RegistrationStatus::Roaming);
    assert_eq!(m.context_ip(1), Some("10.0.0.7"));
    assert_eq!(m.technology(), Technology::NbIot);
}

#[test]
fn echoed_command_turns_echo_off() {
    let (mut m, script) = modem();
    script.on("ATE0", "\r\nOK\r\n");
    script.push("\r\nAT+CSQ\r\n");

    m.service();

    assert_eq!(script.commands(), ["ATE0"]);
}
