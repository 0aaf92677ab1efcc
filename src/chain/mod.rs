pub mod gas;
pub mod monitor;
pub mod redemption;

use alloy::primitives::{address, Address};
use alloy::sol;

/// Polymarket CTF exchange on Polygon.
pub const CTF_EXCHANGE: Address = address!("4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E");

/// Negative-risk CTF exchange. Multi-outcome markets fill here instead.
pub const NEG_RISK_EXCHANGE: Address = address!("C5d563A36AE78145C45a50134d48A1215220f80a");

/// Gnosis conditional tokens framework.
pub const CONDITIONAL_TOKENS: Address = address!("4D97DCd97eC945f40cF65F87097ACe5EA0476045");

/// Bridged USDC, the exchange collateral token.
pub const USDC_E: Address = address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174");

sol! {
    /// Emitted by both exchanges once per side of a matched order.
    #[derive(Debug)]
    event OrderFilled(
        bytes32 indexed orderHash,
        address indexed maker,
        address indexed taker,
        uint256 makerAssetId,
        uint256 takerAssetId,
        uint256 makerAmountFilled,
        uint256 takerAmountFilled,
        uint256 fee
    );

    #[sol(rpc)]
    interface IConditionalTokens {
        function redeemPositions(
            address collateralToken,
            bytes32 parentCollectionId,
            bytes32 conditionId,
            uint256[] calldata indexSets
        ) external;

        function payoutDenominator(bytes32 conditionId) external view returns (uint256);
    }

    /// Minimal call shape for Polymarket proxy wallets. `typeCode` 1 is a
    /// plain CALL.
    #[derive(Debug)]
    struct ProxyCall {
        uint8 typeCode;
        address to;
        uint256 value;
        bytes data;
    }

    #[sol(rpc)]
    interface IProxyWallet {
        function proxy(ProxyCall[] calldata calls) external payable;
    }
}
