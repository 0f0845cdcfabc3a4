//! Wire formats for the on-chain HTLC program.
//!
//! Instructions and the escrow account state are borsh-encoded behind 8-byte
//! discriminators. The escrow account is a PDA derived from the hashlock, so
//! its address is known before the creation transaction lands.

use borsh::{BorshDeserialize, BorshSerialize};
use eyre::{eyre, Result};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::system_program;

/// Instruction and account discriminators.
pub mod discriminators {
    pub const CREATE: [u8; 8] = [0xA1, 0x3C, 0x52, 0x0E, 0x77, 0x19, 0xB4, 0x01];
    pub const WITHDRAW: [u8; 8] = [0xA1, 0x3C, 0x52, 0x0E, 0x77, 0x19, 0xB4, 0x02];
    pub const REFUND: [u8; 8] = [0xA1, 0x3C, 0x52, 0x0E, 0x77, 0x19, 0xB4, 0x03];
    pub const HTLC_ACCOUNT: [u8; 8] = [0x48, 0x54, 0x4C, 0x43, 0x41, 0x43, 0x43, 0x54];
}

/// Seed prefix for escrow PDAs.
pub const ESCROW_SEED: &[u8] = b"htlc";

/// SPL token program id.
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

/// Associated token account program id.
pub const ASSOCIATED_TOKEN_PROGRAM_ID: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";

/// Arguments for the `Create` instruction.
#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct CreateArgs {
    pub receiver: [u8; 32],
    pub amount: u64,
    pub hashlock: [u8; 32],
    pub finality_deadline: u64,
    pub resolver_deadline: u64,
    pub public_deadline: u64,
    pub cancellation_deadline: u64,
}

/// Borsh layout of the escrow account state.
#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct HtlcAccount {
    pub sender: [u8; 32],
    pub receiver: [u8; 32],
    pub mint: [u8; 32],
    pub amount: u64,
    pub hashlock: [u8; 32],
    pub finality_deadline: u64,
    pub resolver_deadline: u64,
    pub public_deadline: u64,
    pub cancellation_deadline: u64,
    pub withdrawn: bool,
    pub refunded: bool,
    /// Zero until a withdrawal stores the revealed preimage.
    pub preimage: [u8; 32],
}

impl HtlcAccount {
    /// Decode account data, checking the discriminator prefix.
    pub fn try_from_account_data(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(eyre!("account data too short: {} bytes", data.len()));
        }
        if data[..8] != discriminators::HTLC_ACCOUNT {
            return Err(eyre!("not an HTLC escrow account"));
        }
        Ok(HtlcAccount::try_from_slice(&data[8..])?)
    }
}

/// Derive the escrow PDA for a hashlock.
pub fn escrow_address(program_id: &Pubkey, hashlock: &[u8; 32]) -> Pubkey {
    Pubkey::find_program_address(&[ESCROW_SEED, hashlock], program_id).0
}

/// Derive the associated token account for `(owner, mint)`.
pub fn associated_token_account(owner: &Pubkey, mint: &Pubkey) -> Result<Pubkey> {
    let token_program: Pubkey = TOKEN_PROGRAM_ID
        .parse()
        .map_err(|_| eyre!("invalid token program id"))?;
    let ata_program: Pubkey = ASSOCIATED_TOKEN_PROGRAM_ID
        .parse()
        .map_err(|_| eyre!("invalid associated token program id"))?;
    let (ata, _) = Pubkey::find_program_address(
        &[owner.as_ref(), token_program.as_ref(), mint.as_ref()],
        &ata_program,
    );
    Ok(ata)
}

fn instruction_data<T: BorshSerialize>(discriminator: [u8; 8], args: &T) -> Result<Vec<u8>> {
    let mut data = discriminator.to_vec();
    data.extend(args.try_to_vec()?);
    Ok(data)
}

/// Build the `Create` instruction funding a new escrow.
pub fn create_instruction(
    program_id: &Pubkey,
    payer: &Pubkey,
    mint: &Pubkey,
    args: &CreateArgs,
) -> Result<Instruction> {
    let escrow = escrow_address(program_id, &args.hashlock);
    let payer_token = associated_token_account(payer, mint)?;

    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(escrow, false),
            AccountMeta::new(payer_token, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID.parse().unwrap_or_default(), false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data: instruction_data(discriminators::CREATE, args)?,
    })
}

/// Build the `Withdraw` instruction revealing the preimage.
pub fn withdraw_instruction(
    program_id: &Pubkey,
    payer: &Pubkey,
    mint: &Pubkey,
    escrow: &Pubkey,
    preimage: &[u8; 32],
) -> Result<Instruction> {
    let payer_token = associated_token_account(payer, mint)?;

    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(*escrow, false),
            AccountMeta::new(payer_token, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID.parse().unwrap_or_default(), false),
        ],
        data: instruction_data(discriminators::WITHDRAW, preimage)?,
    })
}

/// Build the `Refund` instruction reclaiming an expired escrow.
pub fn refund_instruction(
    program_id: &Pubkey,
    payer: &Pubkey,
    mint: &Pubkey,
    escrow: &Pubkey,
) -> Result<Instruction> {
    let payer_token = associated_token_account(payer, mint)?;

    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(*escrow, false),
            AccountMeta::new(payer_token, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID.parse().unwrap_or_default(), false),
        ],
        data: instruction_data(discriminators::REFUND, &())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escrow_address_deterministic() {
        let program_id = Pubkey::new_unique();
        let hashlock = [0x42u8; 32];
        assert_eq!(
            escrow_address(&program_id, &hashlock),
            escrow_address(&program_id, &hashlock)
        );
        assert_ne!(
            escrow_address(&program_id, &hashlock),
            escrow_address(&program_id, &[0x43u8; 32])
        );
    }

    #[test]
    fn test_account_roundtrip() {
        let account = HtlcAccount {
            sender: [1u8; 32],
            receiver: [2u8; 32],
            mint: [3u8; 32],
            amount: 1_000_000,
            hashlock: [4u8; 32],
            finality_deadline: 100,
            resolver_deadline: 200,
            public_deadline: 300,
            cancellation_deadline: 400,
            withdrawn: false,
            refunded: false,
            preimage: [0u8; 32],
        };

        let mut data = discriminators::HTLC_ACCOUNT.to_vec();
        data.extend(account.try_to_vec().unwrap());

        let decoded = HtlcAccount::try_from_account_data(&data).unwrap();
        assert_eq!(decoded.amount, account.amount);
        assert_eq!(decoded.hashlock, account.hashlock);
        assert_eq!(decoded.cancellation_deadline, 400);
    }

    #[test]
    fn test_account_rejects_wrong_discriminator() {
        let mut data = vec![0u8; 8];
        data.extend(vec![0u8; 200]);
        assert!(HtlcAccount::try_from_account_data(&data).is_err());
    }

    #[test]
    fn test_account_rejects_short_data() {
        assert!(HtlcAccount::try_from_account_data(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_instruction_data_prefixed() {
        let args = CreateArgs {
            receiver: [0u8; 32],
            amount: 1,
            hashlock: [0u8; 32],
            finality_deadline: 1,
            resolver_deadline: 2,
            public_deadline: 3,
            cancellation_deadline: 4,
        };
        let program_id = Pubkey::new_unique();
        let payer = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let ix = create_instruction(&program_id, &payer, &mint, &args).unwrap();
        assert_eq!(&ix.data[..8], &discriminators::CREATE);
        assert_eq!(ix.program_id, program_id);
    }
}
