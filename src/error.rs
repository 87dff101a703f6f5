use serde::Serialize;
use thiserror::Error;

use crate::ports::RepositoryError;

/// Closed registry of the protocol errors the provider understands.
/// Codes and localized messages come verbatim from the published
/// merchant API specification.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MerchantError {
    #[error("Order not found")]
    OrderNotFound,

    #[error("The order is already being processed")]
    OrderInProgress,

    #[error("The order has already been paid")]
    OrderAccepted,

    #[error("The order has already been cancelled")]
    OrderCancelled,

    #[error("The transaction amount does not match the order amount")]
    InvalidAmount,

    #[error("Transaction is not active")]
    InactiveTransaction,

    #[error("Could not perform transaction")]
    CouldNotPerformTransaction,

    #[error("Transaction not found")]
    TransactionNotFound,

    #[error("An active transaction already exists for this order")]
    TransactionAlreadyCreated,

    // Reserved: the no-refund-after-completion policy is not enabled.
    #[error("No refund after complete")]
    NoRefund,

    #[error("Failure access")]
    InvalidAccessData,

    #[error("A system error has occurred")]
    SystemError,
}

/// Localized error message as the provider expects it on the wire.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorMessage {
    pub ru: &'static str,
    pub uz: &'static str,
    pub en: &'static str,
}

/// Wire shape of the `error` member of a response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct WireError {
    pub name: &'static str,
    pub code: i32,
    pub message: ErrorMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<&'static str>,
}

impl MerchantError {
    pub fn code(&self) -> i32 {
        match self {
            MerchantError::OrderNotFound => -31050,
            MerchantError::OrderInProgress => -31051,
            MerchantError::OrderAccepted => -31052,
            MerchantError::OrderCancelled => -31053,
            MerchantError::InvalidAmount => -31001,
            MerchantError::InactiveTransaction => -31008,
            MerchantError::CouldNotPerformTransaction => -31008,
            MerchantError::TransactionNotFound => -31003,
            MerchantError::TransactionAlreadyCreated => -31099,
            MerchantError::NoRefund => -31007,
            MerchantError::InvalidAccessData => -32504,
            MerchantError::SystemError => -32400,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MerchantError::OrderNotFound => "Order not Found",
            MerchantError::OrderInProgress => "Order is already being processed",
            MerchantError::OrderAccepted => "Order is already being processed (accepted)",
            MerchantError::OrderCancelled => "Order is already being processed (cancelled)",
            MerchantError::InvalidAmount => {
                "The transaction amount does not match the order amount"
            }
            MerchantError::InactiveTransaction => "Transaction is not active",
            MerchantError::CouldNotPerformTransaction => "Could not to perform transaction",
            MerchantError::TransactionNotFound => "Transaction not found",
            MerchantError::TransactionAlreadyCreated => {
                "Transaction has already been created for this order"
            }
            MerchantError::NoRefund => "No refund after complete",
            MerchantError::InvalidAccessData => "Failure access",
            MerchantError::SystemError => "A system error has occurred.",
        }
    }

    pub fn message(&self) -> ErrorMessage {
        match self {
            MerchantError::OrderNotFound => ErrorMessage {
                ru: "Заказ не найден",
                uz: "Buyurtma topilmadi",
                en: "Order not found",
            },
            MerchantError::OrderInProgress => ErrorMessage {
                ru: "Заказ уже обрабатывается",
                uz: "Buyurtma allaqachon ko'rib chiqilmoqda",
                en: "The order is already being processed",
            },
            MerchantError::OrderAccepted => ErrorMessage {
                ru: "Заказ уже оплачен",
                uz: "Buyurtma allaqachon to'langan",
                en: "The order has already been paid",
            },
            MerchantError::OrderCancelled => ErrorMessage {
                ru: "Заказ уже отменён",
                uz: "Buyurtma allaqachon bekor qilingan",
                en: "The order has already been canceled",
            },
            MerchantError::InvalidAmount => ErrorMessage {
                ru: "Сумма транзакции не совпадает с суммой заказа",
                uz: "Bitim summasi buyurtma summasiga to'g'ri kelmaydi",
                en: "The transaction amount does not match the order amount",
            },
            MerchantError::InactiveTransaction => ErrorMessage {
                ru: "Транзакция не активна или уже была обработана",
                uz: "Bitim faol emas yoki allaqachon qayta ishlangan",
                en: "Transaction is not active",
            },
            MerchantError::CouldNotPerformTransaction => ErrorMessage {
                ru: "Транзакцию не возможно выполнить",
                uz: "Tranzaktsiyani amalga oshirish mumkin emas",
                en: "Could not to perform transaction",
            },
            MerchantError::TransactionNotFound => ErrorMessage {
                ru: "Транзакция не найдена",
                uz: "Bitim topilmadi",
                en: "Transaction not found",
            },
            MerchantError::TransactionAlreadyCreated => ErrorMessage {
                ru: "По заказу уже существует активная транзакция",
                uz: "Buyurtma bo'yicha faol bitim allaqachon mavjud",
                en: "An active transaction already exists for this order",
            },
            MerchantError::NoRefund => ErrorMessage {
                ru: "Заказ выполнен. Невозможно отменить транзакцию. Товар или услуга предоставлена покупателю в полном объеме.",
                uz: "Buyurtma bajarildi. Tranzaktsiyani bekor qilish mumkin emas. Tovar yoki xizmat xaridorga to'liq hajmda taqdim etiladi.",
                en: "The order is completed. It is not possible to cancel the transaction. The product or service is provided to the buyer in full.",
            },
            MerchantError::InvalidAccessData => ErrorMessage {
                ru: "Failure access",
                uz: "Failure access",
                en: "Failure access",
            },
            MerchantError::SystemError => ErrorMessage {
                ru: "Произошла системная ошибка. Пожалуйста обратитесь к поставщику услуг.",
                uz: "Tizim xatosi yuz berdi. Iltimos, xizmat ko'rsatuvchi provayder bilan bog'laning.",
                en: "A system error has occurred. Please contact your service provider.",
            },
        }
    }

    /// Account-related errors carry the offending account field so the
    /// provider can point the payer at it.
    fn data(&self) -> Option<&'static str> {
        match self {
            MerchantError::OrderNotFound
            | MerchantError::OrderInProgress
            | MerchantError::OrderAccepted
            | MerchantError::OrderCancelled => Some("order_id"),
            _ => None,
        }
    }

    pub fn to_wire(&self) -> WireError {
        WireError {
            name: self.name(),
            code: self.code(),
            message: self.message(),
            data: self.data(),
        }
    }
}

/// What a state-machine operation can fail with: a protocol-level
/// domain error the provider reacts to, or an internal failure that
/// the dispatcher collapses into SYSTEM_ERROR.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Merchant(#[from] MerchantError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_published_protocol() {
        assert_eq!(MerchantError::OrderNotFound.code(), -31050);
        assert_eq!(MerchantError::InvalidAmount.code(), -31001);
        assert_eq!(MerchantError::TransactionNotFound.code(), -31003);
        assert_eq!(MerchantError::CouldNotPerformTransaction.code(), -31008);
        assert_eq!(MerchantError::InactiveTransaction.code(), -31008);
        assert_eq!(MerchantError::NoRefund.code(), -31007);
        assert_eq!(MerchantError::InvalidAccessData.code(), -32504);
        assert_eq!(MerchantError::SystemError.code(), -32400);
    }

    #[test]
    fn account_errors_carry_field_hint() {
        assert_eq!(
            MerchantError::OrderNotFound.to_wire().data,
            Some("order_id")
        );
        assert_eq!(MerchantError::InvalidAmount.to_wire().data, None);
    }

    #[test]
    fn wire_error_serializes_localized_message() {
        let wire = MerchantError::TransactionNotFound.to_wire();
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["code"], -31003);
        assert_eq!(json["message"]["en"], "Transaction not found");
        assert!(json.get("data").is_none());
    }
}
