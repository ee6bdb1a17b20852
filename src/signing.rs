//! Proof-of-possession request signing for the `Signature` header.
//!
//! The signed message is the policy version, the FILETIME timestamp, and the request fields,
//! each terminated by a NUL byte:
//!
//! ```text
//! version(u32 BE) 0 filetime(u64 BE) 0 METHOD 0 path_and_query 0 authorization 0 body[..max] 0
//! ```
//!
//! The SHA-256 digest of that buffer is signed with deterministic ECDSA P-256 and the header
//! value is `base64(version || filetime || r || s)`.

pub mod filetime;
pub mod key;

pub use filetime::FileTime;
pub use key::{ProofKey, SigningKey};

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
use p256::ecdsa::{Signature, VerifyingKey, signature::hazmat::PrehashVerifier};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::TokenSecret, error::SignatureError};

/// Raw `r || s` length.
pub const SIGNATURE_LEN: usize = 64;

const VERSION_LEN: usize = 4;
const FILETIME_LEN: usize = 8;
const HEADER_PREFIX_LEN: usize = VERSION_LEN + FILETIME_LEN;

/// Signature policy advertised by the service for an endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SignaturePolicy {
	/// Signature scheme version written as the first four bytes.
	pub version: u32,
	/// Supported algorithms; the first entry is advertised in the proof key.
	pub supported_algorithms: Vec<String>,
	/// Maximum number of body bytes covered by the signature.
	pub max_body_bytes: usize,
}
impl SignaturePolicy {
	/// Algorithm name advertised in the proof key.
	pub fn algorithm(&self) -> &str {
		self.supported_algorithms.first().map(String::as_str).unwrap_or("ES256")
	}
}
impl Default for SignaturePolicy {
	fn default() -> Self {
		Self { version: 1, supported_algorithms: vec!["ES256".into()], max_body_bytes: 8192 }
	}
}

/// Decoded `Signature` header value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureHeader {
	/// Policy version.
	pub version: u32,
	/// Signing timestamp.
	pub timestamp: FileTime,
	/// Raw `r || s`.
	pub signature: [u8; SIGNATURE_LEN],
}
impl SignatureHeader {
	/// Decodes a base64 header value.
	pub fn decode(value: &str) -> Result<Self, SignatureError> {
		let raw = STANDARD.decode(value).map_err(|source| SignatureError::MalformedHeader { source })?;
		let actual = raw.len().saturating_sub(HEADER_PREFIX_LEN);

		if raw.len() != HEADER_PREFIX_LEN + SIGNATURE_LEN {
			return Err(SignatureError::MalformedSignature { expected: SIGNATURE_LEN, actual });
		}

		let (version, rest) = raw.split_at(VERSION_LEN);
		let (timestamp, signature) = rest.split_at(FILETIME_LEN);

		Ok(Self {
			version: u32::from_be_bytes(fixed(version)?),
			timestamp: FileTime::from_be_bytes(fixed(timestamp)?),
			signature: fixed(signature)?,
		})
	}

	/// Encodes the header value.
	pub fn encode(&self) -> String {
		let mut raw = Vec::with_capacity(HEADER_PREFIX_LEN + SIGNATURE_LEN);

		raw.extend_from_slice(&self.version.to_be_bytes());
		raw.extend_from_slice(&self.timestamp.to_be_bytes());
		raw.extend_from_slice(&self.signature);

		STANDARD.encode(raw)
	}
}

/// Signs outbound requests with a [`SigningKey`] under a [`SignaturePolicy`].
#[derive(Clone, Debug)]
pub struct RequestSigner {
	key: SigningKey,
	policy: SignaturePolicy,
}
impl RequestSigner {
	/// Creates a signer with the given key and policy.
	pub fn new(key: SigningKey, policy: SignaturePolicy) -> Self {
		Self { key, policy }
	}

	/// Creates a signer with a freshly generated key and the default policy.
	pub fn generate() -> Self {
		Self::new(SigningKey::generate(), SignaturePolicy::default())
	}

	/// Restores a signer from a PEM-encoded key using the default policy.
	pub fn from_pem(pem: &str) -> Result<Self, SignatureError> {
		Ok(Self::new(SigningKey::from_pem(pem)?, SignaturePolicy::default()))
	}

	/// Replaces the policy.
	pub fn with_policy(mut self, policy: SignaturePolicy) -> Self {
		self.policy = policy;

		self
	}

	/// Active policy.
	pub fn policy(&self) -> &SignaturePolicy {
		&self.policy
	}

	/// Underlying key.
	pub fn key(&self) -> &SigningKey {
		&self.key
	}

	/// Exports the key as SEC1 PEM.
	pub fn export_pem(&self) -> Result<TokenSecret, SignatureError> {
		self.key.to_pem()
	}

	/// JWK proof key presented to the device and title endpoints.
	pub fn proof_key(&self) -> ProofKey {
		self.key.proof_key(self.policy.algorithm())
	}

	/// Builds the canonical byte sequence covered by the signature.
	pub fn canonical_payload(
		&self,
		method: &str,
		path_and_query: &str,
		body: &[u8],
		authorization: &str,
		timestamp: FileTime,
	) -> Result<Vec<u8>, SignatureError> {
		let method = ascii("method", method)?.to_ascii_uppercase();
		let path_and_query = ascii("path_and_query", path_and_query)?;
		let authorization = ascii("authorization", authorization)?;
		let body = &body[..body.len().min(self.policy.max_body_bytes)];
		let fields_len = method.len() + path_and_query.len() + authorization.len() + body.len();
		let mut buf = Vec::with_capacity(HEADER_PREFIX_LEN + fields_len + 6);

		for field in [
			&self.policy.version.to_be_bytes()[..],
			&timestamp.to_be_bytes(),
			method.as_bytes(),
			path_and_query.as_bytes(),
			authorization.as_bytes(),
			body,
		] {
			buf.extend_from_slice(field);
			buf.push(0);
		}

		Ok(buf)
	}

	/// SHA-256 digest of the canonical payload.
	pub fn digest(
		&self,
		method: &str,
		path_and_query: &str,
		body: &[u8],
		authorization: &str,
		timestamp: OffsetDateTime,
	) -> Result<[u8; 32], SignatureError> {
		let timestamp = FileTime::from_datetime(timestamp)?;
		let payload = self.canonical_payload(method, path_and_query, body, authorization, timestamp)?;

		Ok(Sha256::digest(payload).into())
	}

	/// Signs a request and returns the base64 `Signature` header value.
	pub fn sign(
		&self,
		method: &str,
		path_and_query: &str,
		body: &[u8],
		authorization: &str,
		timestamp: OffsetDateTime,
	) -> Result<String, SignatureError> {
		Ok(self.sign_header(method, path_and_query, body, authorization, timestamp)?.encode())
	}

	/// Signs a request at the current instant.
	pub fn sign_now(
		&self,
		method: &str,
		path_and_query: &str,
		body: &[u8],
		authorization: &str,
	) -> Result<String, SignatureError> {
		self.sign(method, path_and_query, body, authorization, OffsetDateTime::now_utc())
	}

	/// Signs a request and returns the decoded header structure.
	pub fn sign_header(
		&self,
		method: &str,
		path_and_query: &str,
		body: &[u8],
		authorization: &str,
		timestamp: OffsetDateTime,
	) -> Result<SignatureHeader, SignatureError> {
		let filetime = FileTime::from_datetime(timestamp)?;
		let payload = self.canonical_payload(method, path_and_query, body, authorization, filetime)?;
		let digest = Sha256::digest(payload);
		let signature = self.key.sign_digest(&digest)?;

		Ok(SignatureHeader { version: self.policy.version, timestamp: filetime, signature })
	}

	/// Verifies raw `r || s` against a prehashed digest.
	///
	/// Uses this signer's public key unless `public_key` is provided. A signature that is not
	/// exactly 64 bytes is an error; a well-formed signature that does not match returns `false`.
	pub fn verify(
		&self,
		signature: &[u8],
		digest: &[u8],
		public_key: Option<&VerifyingKey>,
	) -> Result<bool, SignatureError> {
		if signature.len() != SIGNATURE_LEN {
			return Err(SignatureError::MalformedSignature {
				expected: SIGNATURE_LEN,
				actual: signature.len(),
			});
		}

		let Ok(signature) = Signature::from_slice(signature) else {
			return Ok(false);
		};
		let own_key = self.key.verifying_key();
		let verifier = public_key.unwrap_or(&own_key);

		Ok(verifier.verify_prehash(digest, &signature).is_ok())
	}

	/// Decodes a full header value, recomputes the digest from the request fields, and verifies it.
	pub fn verify_header(
		&self,
		header: &str,
		method: &str,
		path_and_query: &str,
		body: &[u8],
		authorization: &str,
	) -> Result<bool, SignatureError> {
		let decoded = SignatureHeader::decode(header)?;

		if decoded.version != self.policy.version {
			return Err(SignatureError::VersionMismatch {
				expected: self.policy.version,
				found: decoded.version,
			});
		}

		let payload =
			self.canonical_payload(method, path_and_query, body, authorization, decoded.timestamp)?;
		let digest = Sha256::digest(payload);

		self.verify(&decoded.signature, &digest, None)
	}
}

fn ascii<'a>(field: &'static str, value: &'a str) -> Result<&'a str, SignatureError> {
	if value.is_ascii() { Ok(value) } else { Err(SignatureError::NonAscii { field }) }
}

fn fixed<const N: usize>(bytes: &[u8]) -> Result<[u8; N], SignatureError> {
	<[u8; N]>::try_from(bytes)
		.map_err(|_| SignatureError::MalformedSignature { expected: N, actual: bytes.len() })
}
