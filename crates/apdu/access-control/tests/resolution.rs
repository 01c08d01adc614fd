//! End-to-end resolution scenarios for the access rule cache

use std::{
    io,
    sync::{Arc, Mutex},
};

use hex_literal::hex;
use nexum_apdu_access_control::{constants::reason, prelude::*};
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

const H1: [u8; 32] = hex!("8A9C6B3D2E4F5061728394A5B6C7D8E9F00112233445566778899AABBCCDDEEF");
const H2: [u8; 32] = hex!("1111111111111111111111111111111111111111111111111111111111111111");
const AID: [u8; 9] = hex!("A00000015141434C00");

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Log sink shared between the subscriber and the test
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn cache() -> AccessRuleCache {
    init_tracing();
    AccessRuleCache::with_config(CacheConfig::new().with_log_rule_contents(true))
}

fn all_rules() -> RuleKey {
    RuleKey::new(AidRef::AllSeApplications, HashRef::AllDeviceApplications)
}

#[test]
fn test_default_applet_pinned_to_other_hash() {
    let mut cache = cache();

    cache.merge_ar_do(
        RuleKey::new(AidRef::DefaultApplication, HashRef::AllDeviceApplications),
        &ArDo::new(Some(ApduArDo::Always), None),
    );
    cache.merge_ar_do(
        RuleKey::new(AidRef::DefaultApplication, HashRef::new(H1.to_vec())),
        &ArDo::new(Some(ApduArDo::Never), None),
    );
    cache.merge_ar_do(all_rules(), &ArDo::new(Some(ApduArDo::Always), Some(NfcArDo::Always)));

    // The dedicated rule for H1 wins
    let access = cache.find_access_rule(Some(&[]), &[H1]).unwrap();
    assert_eq!(access.access(), Access::Denied);
    assert_eq!(access.apdu_access(), Access::Denied);
    assert_eq!(access.nfc_event_access(), Access::Denied);

    // Another device application hits the conflict rule, not the generic ones
    let access = cache.find_access_rule(Some(&[]), &[H2]).unwrap();
    assert_eq!(access, ChannelAccess::denied(reason::SPECIFIC_AID_OTHER_HASH));

    // Other applets still fall through to the catch-all rule
    let access = cache.find_access_rule(Some(&AID), &[H2]).unwrap();
    assert_eq!(access.apdu_access(), Access::Allowed);
    assert_eq!(access.nfc_event_access(), Access::Allowed);
}

#[test]
fn test_missing_nfc_rule_resolution() {
    let mut cache = cache();
    let filter = ApduFilter::new(hex!("80CA0000"), hex!("FFFF0000"));

    cache.merge_ar_do(
        RuleKey::new(AidRef::specific(AID.to_vec()), HashRef::new(H1.to_vec())),
        &ArDo::new(Some(ApduArDo::Always), None),
    );
    cache.merge_ar_do(
        RuleKey::new(AidRef::specific(AID.to_vec()), HashRef::new(H2.to_vec())),
        &ArDo::new(Some(ApduArDo::Filtered(vec![filter])), None),
    );
    cache.merge_ar_do(
        RuleKey::new(AidRef::AllSeApplications, HashRef::new(H1.to_vec())),
        &ArDo::new(Some(ApduArDo::Never), None),
    );

    let always = cache.find_access_rule(Some(&AID), &[H1]).unwrap();
    assert_eq!(always.nfc_event_access(), Access::Allowed);

    let filtered = cache.find_access_rule(Some(&AID), &[H2]).unwrap();
    assert_eq!(filtered.nfc_event_access(), Access::Allowed);
    assert!(filtered.check_command(&hex!("80CA9F7F00")).is_ok());
    assert!(filtered.check_command(&hex!("80CB9F7F00")).is_err());

    let never = cache.find_access_rule(Some(&hex!("A0000002")), &[H1]).unwrap();
    assert_eq!(never.nfc_event_access(), Access::Denied);
    assert!(never.check_nfc_event().is_err());
}

#[test]
fn test_no_rule_is_denied_by_resolve() {
    let mut cache = cache();
    assert_eq!(cache.find_access_rule(Some(&AID), &[H1]), None);

    let access = cache.resolve(Some(&AID), &[H1]);
    assert_eq!(access, ChannelAccess::denied(reason::NO_RULE_FOUND));
    assert_eq!(
        access.check_command(&hex!("00A40400")),
        Err(Error::AccessDenied(reason::NO_RULE_FOUND.into()))
    );

    cache.merge_ar_do(all_rules(), &ArDo::new(Some(ApduArDo::Always), None));
    assert!(cache.resolve(Some(&AID), &[H1]).check_command(&hex!("00A40400")).is_ok());
}

#[test]
fn test_carrier_privilege_is_independent_of_aid_rules() {
    let mut cache = cache();

    let carrier = RuleRef::from_parts(None, HashRef::new(H1.to_vec()), None).unwrap();
    cache.merge_ar_do(carrier, &ArDo::default());
    cache.merge_ar_do(
        RuleKey::new(AidRef::AllSeApplications, HashRef::new(H1.to_vec())),
        &ArDo::new(Some(ApduArDo::Never), None),
    );

    assert!(cache.check_carrier_privilege("com.example.app", &[H2, H1]));
    assert!(!cache.check_carrier_privilege("com.example.app", &[H2]));

    let access = cache.find_access_rule(Some(&AID), &[H1]).unwrap();
    assert_eq!(access.apdu_access(), Access::Denied);
}

#[test]
fn test_reset_forgets_everything() {
    let mut cache = cache();
    let tag = hex!("0102030405060708");

    cache.set_refresh_tag(Some(tag.to_vec().into()));
    cache.merge_ar_do(all_rules(), &ArDo::new(Some(ApduArDo::Always), None));
    cache.merge_ar_do(
        RuleRef::from_parts(None, HashRef::new(H1.to_vec()), Some("com.example".into())).unwrap(),
        &ArDo::default(),
    );

    assert!(cache.is_refresh_tag_equal(Some(&tag)));
    assert!(cache.find_access_rule(Some(&AID), &[H1]).is_some());
    assert!(cache.check_carrier_privilege("com.example", &[H1]));

    cache.reset();

    assert!(!cache.is_refresh_tag_equal(Some(&tag)));
    assert_eq!(cache.find_access_rule(Some(&AID), &[H1]), None);
    assert!(!cache.check_carrier_privilege("com.example", &[H1]));
    assert!(cache.is_empty());
}

#[test]
fn test_not_found_log_names_requested_aid() {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let _guard = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(move || writer.clone())
        .finish()
        .set_default();

    let cache = AccessRuleCache::new();
    assert_eq!(cache.find_access_rule(Some(&hex!("A0000002")), &[H1]), None);

    let logs = logs.contents();
    let line = logs
        .lines()
        .find(|line| line.contains("No access rule found"))
        .unwrap();
    assert!(line.contains("aid=AID=A0000002"), "{line}");
}
