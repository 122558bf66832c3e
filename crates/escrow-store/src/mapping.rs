//! String <-> enum conversions for every `TEXT CHECK (...)` column in
//! `migrations/0001_init.sql`. Kept as plain match arms (rather than
//! `serde_json` round-tripping through the `snake_case` derive) so a typo in
//! either direction is a compile error, not a runtime surprise.

use escrow_types::{
    Actor, BotStatus, ListingKind, ListingStatus, NotificationKind, NotificationStatus, RiskEventKind, TradeStatus,
    TransactionKind, TransactionStatus,
};

pub fn trade_status_to_str(s: TradeStatus) -> &'static str {
    match s {
        TradeStatus::PendingPayment => "pending_payment",
        TradeStatus::PaymentReceived => "payment_received",
        TradeStatus::AwaitingSeller => "awaiting_seller",
        TradeStatus::SellerAccepted => "seller_accepted",
        TradeStatus::AwaitingBuyer => "awaiting_buyer",
        TradeStatus::BuyerAccepted => "buyer_accepted",
        TradeStatus::Completed => "completed",
        TradeStatus::Cancelled => "cancelled",
        TradeStatus::Refunded => "refunded",
        TradeStatus::Expired => "expired",
        TradeStatus::Disputed => "disputed",
        TradeStatus::ErrorSending => "error_sending",
        TradeStatus::ErrorForwarding => "error_forwarding",
    }
}

pub fn trade_status_from_str(s: &str) -> Option<TradeStatus> {
    Some(match s {
        "pending_payment" => TradeStatus::PendingPayment,
        "payment_received" => TradeStatus::PaymentReceived,
        "awaiting_seller" => TradeStatus::AwaitingSeller,
        "seller_accepted" => TradeStatus::SellerAccepted,
        "awaiting_buyer" => TradeStatus::AwaitingBuyer,
        "buyer_accepted" => TradeStatus::BuyerAccepted,
        "completed" => TradeStatus::Completed,
        "cancelled" => TradeStatus::Cancelled,
        "refunded" => TradeStatus::Refunded,
        "expired" => TradeStatus::Expired,
        "disputed" => TradeStatus::Disputed,
        "error_sending" => TradeStatus::ErrorSending,
        "error_forwarding" => TradeStatus::ErrorForwarding,
        _ => return None,
    })
}

pub fn listing_status_to_str(s: ListingStatus) -> &'static str {
    match s {
        ListingStatus::Active => "active",
        ListingStatus::Reserved => "reserved",
        ListingStatus::Sold => "sold",
        ListingStatus::Cancelled => "cancelled",
        ListingStatus::Removed => "removed",
        ListingStatus::Expired => "expired",
    }
}

pub fn listing_status_from_str(s: &str) -> Option<ListingStatus> {
    Some(match s {
        "active" => ListingStatus::Active,
        "reserved" => ListingStatus::Reserved,
        "sold" => ListingStatus::Sold,
        "cancelled" => ListingStatus::Cancelled,
        "removed" => ListingStatus::Removed,
        "expired" => ListingStatus::Expired,
        _ => return None,
    })
}

pub fn listing_kind_to_str(k: ListingKind) -> &'static str {
    match k {
        ListingKind::BotOwned => "bot_owned",
        ListingKind::Peer => "peer",
    }
}

pub fn listing_kind_from_str(s: &str) -> Option<ListingKind> {
    Some(match s {
        "bot_owned" => ListingKind::BotOwned,
        "peer" => ListingKind::Peer,
        _ => return None,
    })
}

pub fn actor_to_str(a: Actor) -> &'static str {
    match a {
        Actor::System => "system",
        Actor::Admin => "admin",
        Actor::User => "user",
    }
}

pub fn actor_from_str(s: &str) -> Option<Actor> {
    Some(match s {
        "system" => Actor::System,
        "admin" => Actor::Admin,
        "user" => Actor::User,
        _ => return None,
    })
}

pub fn transaction_kind_to_str(k: TransactionKind) -> &'static str {
    match k {
        TransactionKind::DebitHold => "debit_hold",
        TransactionKind::ReleaseHold => "release_hold",
        TransactionKind::Capture => "capture",
        TransactionKind::Payout => "payout",
        TransactionKind::Fee => "fee",
        TransactionKind::Refund => "refund",
        TransactionKind::Adjust => "adjust",
    }
}

pub fn transaction_kind_from_str(s: &str) -> Option<TransactionKind> {
    Some(match s {
        "debit_hold" => TransactionKind::DebitHold,
        "release_hold" => TransactionKind::ReleaseHold,
        "capture" => TransactionKind::Capture,
        "payout" => TransactionKind::Payout,
        "fee" => TransactionKind::Fee,
        "refund" => TransactionKind::Refund,
        "adjust" => TransactionKind::Adjust,
        _ => return None,
    })
}

pub fn transaction_status_to_str(s: TransactionStatus) -> &'static str {
    match s {
        TransactionStatus::Pending => "pending",
        TransactionStatus::Posted => "posted",
        TransactionStatus::Reversed => "reversed",
    }
}

pub fn transaction_status_from_str(s: &str) -> Option<TransactionStatus> {
    Some(match s {
        "pending" => TransactionStatus::Pending,
        "posted" => TransactionStatus::Posted,
        "reversed" => TransactionStatus::Reversed,
        _ => return None,
    })
}

pub fn bot_status_to_str(s: BotStatus) -> &'static str {
    match s {
        BotStatus::Offline => "offline",
        BotStatus::Initializing => "initializing",
        BotStatus::Ready => "ready",
        BotStatus::Degraded => "degraded",
        BotStatus::Banned => "banned",
    }
}

pub fn bot_status_from_str(s: &str) -> Option<BotStatus> {
    Some(match s {
        "offline" => BotStatus::Offline,
        "initializing" => BotStatus::Initializing,
        "ready" => BotStatus::Ready,
        "degraded" => BotStatus::Degraded,
        "banned" => BotStatus::Banned,
        _ => return None,
    })
}

pub fn notification_status_to_str(s: NotificationStatus) -> &'static str {
    match s {
        NotificationStatus::Pending => "pending",
        NotificationStatus::Delivered => "delivered",
        NotificationStatus::Read => "read",
    }
}

pub fn notification_status_from_str(s: &str) -> Option<NotificationStatus> {
    Some(match s {
        "pending" => NotificationStatus::Pending,
        "delivered" => NotificationStatus::Delivered,
        "read" => NotificationStatus::Read,
        _ => return None,
    })
}

pub fn notification_kind_to_str(k: NotificationKind) -> &'static str {
    match k {
        NotificationKind::TradeCreated => "trade_created",
        NotificationKind::PaymentReceived => "payment_received",
        NotificationKind::AwaitingSeller => "awaiting_seller",
        NotificationKind::AwaitingBuyer => "awaiting_buyer",
        NotificationKind::TradeCompleted => "trade_completed",
        NotificationKind::TradeRefunded => "trade_refunded",
        NotificationKind::TradeExpired => "trade_expired",
        NotificationKind::TradeDisputed => "trade_disputed",
        NotificationKind::TradeCancelled => "trade_cancelled",
    }
}

pub fn notification_kind_from_str(s: &str) -> Option<NotificationKind> {
    Some(match s {
        "trade_created" => NotificationKind::TradeCreated,
        "payment_received" => NotificationKind::PaymentReceived,
        "awaiting_seller" => NotificationKind::AwaitingSeller,
        "awaiting_buyer" => NotificationKind::AwaitingBuyer,
        "trade_completed" => NotificationKind::TradeCompleted,
        "trade_refunded" => NotificationKind::TradeRefunded,
        "trade_expired" => NotificationKind::TradeExpired,
        "trade_disputed" => NotificationKind::TradeDisputed,
        "trade_cancelled" => NotificationKind::TradeCancelled,
        _ => return None,
    })
}

pub fn risk_event_kind_to_str(k: RiskEventKind) -> &'static str {
    match k {
        RiskEventKind::ApiKeyChanged => "api_key_changed",
        RiskEventKind::ItemMissing => "item_missing",
        RiskEventKind::RapidCancellations => "rapid_cancellations",
        RiskEventKind::OwnershipCheckFailed => "ownership_check_failed",
    }
}

pub fn risk_event_kind_from_str(s: &str) -> Option<RiskEventKind> {
    Some(match s {
        "api_key_changed" => RiskEventKind::ApiKeyChanged,
        "item_missing" => RiskEventKind::ItemMissing,
        "rapid_cancellations" => RiskEventKind::RapidCancellations,
        "ownership_check_failed" => RiskEventKind::OwnershipCheckFailed,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_status_round_trips() {
        for s in [
            TradeStatus::PendingPayment,
            TradeStatus::PaymentReceived,
            TradeStatus::AwaitingSeller,
            TradeStatus::SellerAccepted,
            TradeStatus::AwaitingBuyer,
            TradeStatus::BuyerAccepted,
            TradeStatus::Completed,
            TradeStatus::Cancelled,
            TradeStatus::Refunded,
            TradeStatus::Expired,
            TradeStatus::Disputed,
            TradeStatus::ErrorSending,
            TradeStatus::ErrorForwarding,
        ] {
            assert_eq!(trade_status_from_str(trade_status_to_str(s)), Some(s));
        }
    }
}
