// crates.io
use time::{OffsetDateTime, macros};
// self
use xbl_core::{
	error::SignatureError,
	signing::{FileTime, RequestSigner, SignatureHeader},
};

const INSTANT: OffsetDateTime = macros::datetime!(2025-03-14 09:26:53.589793 UTC);
const AUTHORIZATION: &str = "XBL3.0 x=2535405290;eyJlbmMiOiJBMTI4Q0JDK0hTMjU2In0";

struct Fields<'a> {
	method: &'a str,
	path: &'a str,
	body: &'a [u8],
	authorization: &'a str,
	timestamp: OffsetDateTime,
}
impl Default for Fields<'_> {
	fn default() -> Self {
		Self {
			method: "POST",
			path: "/users/xuid(2535405291234567)/profile/settings?settings=Gamertag",
			body: br#"{"userIds":["2535405291234567"]}"#,
			authorization: AUTHORIZATION,
			timestamp: INSTANT,
		}
	}
}

fn sign(signer: &RequestSigner, fields: &Fields) -> String {
	signer
		.sign(fields.method, fields.path, fields.body, fields.authorization, fields.timestamp)
		.expect("Signing fixture fields should succeed.")
}

#[test]
fn signatures_are_deterministic_and_verify() {
	let signer = RequestSigner::generate();
	let fields = Fields::default();
	let first = sign(&signer, &fields);

	assert_eq!(first, sign(&signer, &fields));
	assert!(
		signer
			.verify_header(&first, fields.method, fields.path, fields.body, fields.authorization)
			.expect("Header should decode.")
	);

	let header = SignatureHeader::decode(&first).expect("Header should decode.");

	assert_eq!(header.version, 1);
	assert_eq!(header.timestamp, FileTime::from_datetime(INSTANT).expect("Instant fits FILETIME."));
}

#[test]
fn every_field_is_covered() {
	let signer = RequestSigner::generate();
	let baseline = sign(&signer, &Fields::default());
	let variants = [
		Fields { method: "PUT", ..Fields::default() },
		Fields { path: "/users/me/profile/settings", ..Fields::default() },
		Fields { body: b"{}", ..Fields::default() },
		Fields { authorization: "", ..Fields::default() },
	];

	for variant in &variants {
		assert_ne!(sign(&signer, variant), baseline);
		assert!(
			!signer
				.verify_header(
					&baseline,
					variant.method,
					variant.path,
					variant.body,
					variant.authorization,
				)
				.expect("Header should decode."),
			"A signature must not verify against altered request fields."
		);
	}

	let later = Fields { timestamp: INSTANT + time::Duration::microseconds(1), ..Fields::default() };

	assert_ne!(sign(&signer, &later), baseline);
}

#[test]
fn field_boundaries_are_unambiguous() {
	let signer = RequestSigner::generate();
	let split_early = signer
		.canonical_payload("GET", "/a", b"", "bc", FileTime::from_ticks(1))
		.expect("Payload should build.");
	let split_late = signer
		.canonical_payload("GET", "/ab", b"", "c", FileTime::from_ticks(1))
		.expect("Payload should build.");

	assert_ne!(split_early, split_late);
	assert_ne!(
		sign(&signer, &Fields { path: "/a", authorization: "bc", ..Fields::default() }),
		sign(&signer, &Fields { path: "/ab", authorization: "c", ..Fields::default() })
	);
}

#[test]
fn exported_key_keeps_signing_identically() {
	let signer = RequestSigner::generate();
	let pem = signer.export_pem().expect("Generated key should export.");
	let restored = RequestSigner::from_pem(pem.expose()).expect("Exported PEM should import.");
	let fields = Fields::default();

	assert_eq!(sign(&signer, &fields), sign(&restored, &fields));
	assert_eq!(signer.proof_key(), restored.proof_key());
}

#[test]
fn foreign_signatures_and_malformed_headers_fail() {
	let signer = RequestSigner::generate();
	let other = RequestSigner::generate();
	let fields = Fields::default();
	let foreign = sign(&other, &fields);

	assert!(
		!signer
			.verify_header(&foreign, fields.method, fields.path, fields.body, fields.authorization)
			.expect("Header should decode.")
	);
	assert!(signer.verify_header("not base64!", "GET", "/", b"", "").is_err());
	assert!(matches!(
		signer.verify(&[0; 63], &[0; 32], None),
		Err(SignatureError::MalformedSignature { expected: 64, actual: 63 })
	));
}

#[test]
fn filetime_round_trip_is_exact() {
	for instant in [
		macros::datetime!(1601-01-01 00:00 UTC),
		macros::datetime!(1970-01-01 00:00 UTC),
		INSTANT,
		macros::datetime!(2099-12-31 23:59:59.9999999 UTC),
	] {
		let filetime = FileTime::from_datetime(instant).expect("Instant fits FILETIME.");

		assert_eq!(filetime.to_datetime().expect("Ticks convert back."), instant);
		assert_eq!(FileTime::from_be_bytes(filetime.to_be_bytes()), filetime);
	}

	assert!(FileTime::from_datetime(macros::datetime!(1600-12-31 23:59:59 UTC)).is_err());
}
