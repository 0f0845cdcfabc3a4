//! HTLC factory contract ABI definitions.
//!
//! Uses alloy's sol! macro to generate type-safe bindings. The factory keys
//! every HTLC by a bytes32 id equal to its hashlock, so the id is known to
//! the caller before the creation transaction confirms.

#![allow(clippy::too_many_arguments)]

use alloy::sol;

sol! {
    /// HTLC factory: holds every hash time-locked contract on this chain,
    /// keyed by hashlock.
    #[sol(rpc)]
    contract HtlcFactory {
        /// Create and fund an HTLC. Reverts if an HTLC with this hashlock
        /// already exists, the cancellation deadline is in the past, or the
        /// token transfer fails.
        function createHTLC(
            address receiver,
            address token,
            uint256 amount,
            bytes32 hashlock,
            uint256 finalityDeadline,
            uint256 resolverDeadline,
            uint256 publicDeadline,
            uint256 cancellationDeadline
        ) external returns (bytes32 id);

        /// Claim the funds by revealing the preimage.
        function withdraw(bytes32 id, bytes32 preimage) external;

        /// Return the funds to the sender after the cancellation deadline.
        function refund(bytes32 id) external;

        /// Current state of one HTLC.
        function getHTLC(bytes32 id) external view returns (
            address sender,
            address receiver,
            address token,
            uint256 amount,
            bytes32 hashlock,
            uint256 finalityDeadline,
            uint256 cancellationDeadline,
            bool withdrawn,
            bool refunded,
            bool exists
        );

        /// HTLC created and funded.
        event HTLCCreated(
            bytes32 indexed id,
            address indexed sender,
            address token,
            uint256 amount,
            bytes32 hashlock
        );

        /// Funds claimed; the preimage is now public.
        event HTLCWithdrawn(bytes32 indexed id, bytes32 preimage);

        /// Funds returned to the sender.
        event HTLCRefunded(bytes32 indexed id);
    }

    /// Minimal ERC20 surface for balance queries.
    #[sol(rpc)]
    contract ERC20 {
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
    }
}
