//! Versioned transactions that travel between parties partially signed.
//!
//! A transaction-request endpoint compiles a transaction whose fee payer is
//! the requesting wallet, optionally signs its own slot, and hands the
//! result over as base64. The wallet decodes it, checks it is the fee payer,
//! and adds its signature. [`PartialTransaction`] covers both sides.

use solana_instruction::Instruction;
use solana_message::v0::Message as MessageV0;
use solana_message::{Hash, VersionedMessage};
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_signer::Signer;
use solana_transaction::versioned::VersionedTransaction;
use solpay::encoding::Base64Blob;
use solpay::proto::TransactionResponse;
use solpay::ErrorKind;

/// Failure building, signing or (de)serializing a transaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    /// The message could not be compiled from its instructions.
    #[error("failed to compile message: {0}")]
    Compile(String),
    /// The signer failed or is not a required signer of the message.
    #[error("failed to sign transaction: {0}")]
    Sign(String),
    /// The transaction could not be serialized.
    #[error("failed to encode transaction: {0}")]
    Encode(String),
    /// The blob is not a serialized transaction.
    #[error("failed to decode transaction: {0}")]
    Decode(String),
    /// The fee payer is not the expected account.
    #[error("fee payer is {found}, expected {expected}")]
    FeePayerMismatch {
        /// The requesting account.
        expected: Pubkey,
        /// The fee payer found in the message.
        found: Pubkey,
    },
    /// The message lists no account keys.
    #[error("transaction has no fee payer")]
    MissingFeePayer,
    /// A co-signer was asked to fill the fee payer's slot.
    #[error("{0} is the fee payer and cannot co-sign")]
    FeePayerCosigner(Pubkey),
    /// The signature vector does not match the message header.
    #[error("transaction carries {found} signatures, header requires {expected}")]
    SignatureCount {
        /// Signatures required by the header.
        expected: usize,
        /// Signatures present.
        found: usize,
    },
}

impl TransactionError {
    /// Classifies the failure. Decoding checks reject what another party
    /// sent; everything else is a local failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(_)
            | Self::FeePayerMismatch { .. }
            | Self::MissingFeePayer
            | Self::SignatureCount { .. } => ErrorKind::MalformedInput,
            Self::Compile(_) | Self::Sign(_) | Self::Encode(_) | Self::FeePayerCosigner(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// A versioned transaction whose signatures may still be incomplete.
///
/// Unfilled signature slots hold [`Signature::default`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialTransaction {
    inner: VersionedTransaction,
}

impl PartialTransaction {
    /// Wraps an existing transaction.
    #[must_use]
    pub const fn new(transaction: VersionedTransaction) -> Self {
        Self { inner: transaction }
    }

    /// Compiles a v0 message paid by `fee_payer` with every signature slot
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::Compile`] if the instructions cannot be
    /// compiled into a message.
    pub fn compile(
        fee_payer: &Pubkey,
        instructions: &[Instruction],
        blockhash: Hash,
    ) -> Result<Self, TransactionError> {
        let message = MessageV0::try_compile(fee_payer, instructions, &[], blockhash)
            .map_err(|e| TransactionError::Compile(format!("{e:?}")))?;
        let num_required = usize::from(message.header.num_required_signatures);
        Ok(Self {
            inner: VersionedTransaction {
                signatures: vec![Signature::default(); num_required],
                message: VersionedMessage::V0(message),
            },
        })
    }

    /// Returns the inner transaction.
    #[must_use]
    pub const fn inner(&self) -> &VersionedTransaction {
        &self.inner
    }

    /// Consumes the wrapper, returning the inner transaction.
    #[must_use]
    pub fn into_inner(self) -> VersionedTransaction {
        self.inner
    }

    /// Returns the account paying the fees.
    #[must_use]
    pub fn fee_payer(&self) -> Option<&Pubkey> {
        self.inner.message.static_account_keys().first()
    }

    /// Returns the accounts whose signatures the message requires.
    #[must_use]
    pub fn required_signers(&self) -> &[Pubkey] {
        let keys = self.inner.message.static_account_keys();
        let num_required = usize::from(self.inner.message.header().num_required_signatures);
        &keys[..num_required.min(keys.len())]
    }

    /// Returns `true` if `signer`'s slot carries a signature.
    #[must_use]
    pub fn is_signed_by(&self, signer: &Pubkey) -> bool {
        self.required_signers()
            .iter()
            .position(|key| key == signer)
            .and_then(|pos| self.inner.signatures.get(pos))
            .is_some_and(|signature| *signature != Signature::default())
    }

    /// Checks if the transaction is fully signed.
    #[must_use]
    pub fn is_fully_signed(&self) -> bool {
        let num_required = usize::from(self.inner.message.header().num_required_signatures);
        self.inner.signatures.len() >= num_required
            && self
                .inner
                .signatures
                .iter()
                .all(|signature| *signature != Signature::default())
    }

    /// Adds the signature of a co-signer, leaving every other slot as is.
    ///
    /// Slot 0 belongs to the requesting wallet and is never filled here.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::FeePayerCosigner`] if `signer` is the fee
    /// payer, and [`TransactionError::Sign`] if signing fails or the signer
    /// is not a required signer.
    pub fn sign_with<S: Signer + ?Sized>(self, signer: &S) -> Result<Self, TransactionError> {
        let pubkey = signer.pubkey();
        if self.fee_payer() == Some(&pubkey) {
            return Err(TransactionError::FeePayerCosigner(pubkey));
        }
        self.fill_slot(signer)
    }

    /// Adds the fee payer's signature, the last step on the wallet side.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::FeePayerMismatch`] if `signer` is not the
    /// fee payer, and [`TransactionError::Sign`] if signing fails.
    pub fn sign_as_fee_payer<S: Signer + ?Sized>(
        self,
        signer: &S,
    ) -> Result<Self, TransactionError> {
        let fee_payer = *self.fee_payer().ok_or(TransactionError::MissingFeePayer)?;
        if fee_payer != signer.pubkey() {
            return Err(TransactionError::FeePayerMismatch {
                expected: signer.pubkey(),
                found: fee_payer,
            });
        }
        self.fill_slot(signer)
    }

    fn fill_slot<S: Signer + ?Sized>(self, signer: &S) -> Result<Self, TransactionError> {
        let mut tx = self.inner;
        let num_required = usize::from(tx.message.header().num_required_signatures);
        let pos = tx
            .message
            .static_account_keys()
            .iter()
            .take(num_required)
            .position(|k| *k == signer.pubkey())
            .ok_or_else(|| {
                TransactionError::Sign(format!("{} is not a required signer", signer.pubkey()))
            })?;

        let signature = signer
            .try_sign_message(&tx.message.serialize())
            .map_err(|e| TransactionError::Sign(format!("{e}")))?;
        if tx.signatures.len() < num_required {
            tx.signatures.resize(num_required, Signature::default());
        }
        tx.signatures[pos] = signature;
        Ok(Self { inner: tx })
    }

    /// Serializes the transaction and encodes it as base64.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::Encode`] if serialization fails.
    pub fn to_base64(&self) -> Result<Base64Blob, TransactionError> {
        let bytes =
            bincode::serialize(&self.inner).map_err(|e| TransactionError::Encode(format!("{e}")))?;
        Ok(Base64Blob::encode(bytes))
    }

    /// Decodes a base64 serialized transaction.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::Decode`] if the blob is not base64 or not a
    /// transaction.
    pub fn from_base64(blob: &Base64Blob) -> Result<Self, TransactionError> {
        let bytes = blob
            .decode()
            .map_err(|e| TransactionError::Decode(format!("{e}")))?;
        let inner: VersionedTransaction =
            bincode::deserialize(&bytes).map_err(|e| TransactionError::Decode(format!("{e}")))?;
        Ok(Self { inner })
    }

    /// Decodes the transaction of a `POST` response and checks that it is
    /// meant for `account`.
    ///
    /// The fee payer must be `account` and the signature vector must have
    /// exactly as many slots as the header requires. Signatures already
    /// present are not verified.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError`] if decoding or any check fails.
    pub fn from_response(
        response: &TransactionResponse,
        account: &Pubkey,
    ) -> Result<Self, TransactionError> {
        let tx = Self::from_base64(&response.transaction)?;
        let fee_payer = *tx.fee_payer().ok_or(TransactionError::MissingFeePayer)?;
        if fee_payer != *account {
            return Err(TransactionError::FeePayerMismatch {
                expected: *account,
                found: fee_payer,
            });
        }
        let expected = usize::from(tx.inner.message.header().num_required_signatures);
        let found = tx.inner.signatures.len();
        if expected != found {
            return Err(TransactionError::SignatureCount { expected, found });
        }
        Ok(tx)
    }
}

impl From<VersionedTransaction> for PartialTransaction {
    fn from(transaction: VersionedTransaction) -> Self {
        Self::new(transaction)
    }
}
