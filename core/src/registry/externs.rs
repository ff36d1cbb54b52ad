//! Extern signatures the compiler emits on its own.
//!
//! Signatures follow the target ISA's mangling:
//! `{Owner}.__{method}__{Param1}_{Param2}__{Return}`, with the parameter
//! section left out for parameterless methods.

use crate::types::ValueType;
use crate::{String, format};

pub const VOID: &str = "SystemVoid";
const EVENT_RECEIVER: &str = "VRCUdonCommonInterfacesIUdonEventReceiver";
const NETWORKING: &str = "VRCSDKBaseNetworking";

/// Type of the `target` argument of a network event.
pub const NETWORK_EVENT_TARGET: &str = "VRCUdonCommonInterfacesNetworkEventTarget";
/// Type of the `timing` argument of a delayed event.
pub const EVENT_TIMING: &str = "VRCUdonCommonEnumsEventTiming";

pub fn signature(owner: &str, method: &str, params: &[&str], ret: &str) -> String {
    if params.is_empty() {
        format!("{}.__{}__{}", owner, method, ret)
    } else {
        format!("{}.__{}__{}__{}", owner, method, params.join("_"), ret)
    }
}

/// `a {op} b` for two operands of the same type.
pub fn binary_operator(ty: &ValueType, op: &str, ret: &ValueType) -> String {
    let name = ty.isa_name();
    signature(name, &format!("op_{}", op), &[name, name], ret.isa_name())
}

/// Value comparison, for value types.
pub fn inequality(ty: &ValueType) -> String {
    binary_operator(ty, "Inequality", &ValueType::Boolean)
}

/// Boxed equality, for everything that is not a value type.
pub fn object_equals() -> String {
    signature(
        "SystemObject",
        "Equals",
        &["SystemObject", "SystemObject"],
        "SystemBoolean",
    )
}

pub fn boolean_negation() -> String {
    signature(
        "SystemBoolean",
        "op_UnaryNegation",
        &["SystemBoolean"],
        "SystemBoolean",
    )
}

pub fn int_operator(op: &str) -> String {
    binary_operator(&ValueType::Int32, op, &ValueType::Int32)
}

pub fn int_comparison(op: &str) -> String {
    binary_operator(&ValueType::Int32, op, &ValueType::Boolean)
}

/// `this.SendCustomEvent(name)`: synchronous call of an exported method.
pub fn send_custom_event() -> String {
    signature(EVENT_RECEIVER, "SendCustomEvent", &["SystemString"], VOID)
}

/// `this.SendCustomNetworkEvent(target, name)`
pub fn send_custom_network_event() -> String {
    signature(
        EVENT_RECEIVER,
        "SendCustomNetworkEvent",
        &[NETWORK_EVENT_TARGET, "SystemString"],
        VOID,
    )
}

/// `this.SendCustomEventDelayedSeconds(name, delay, timing)`
pub fn send_custom_event_delayed_seconds() -> String {
    signature(
        EVENT_RECEIVER,
        "SendCustomEventDelayedSeconds",
        &["SystemString", "SystemSingle", EVENT_TIMING],
        VOID,
    )
}

pub fn request_serialization() -> String {
    signature(EVENT_RECEIVER, "RequestSerialization", &[], VOID)
}

pub fn is_owner() -> String {
    signature(NETWORKING, "IsOwner", &["UnityEngineGameObject"], "SystemBoolean")
}

pub fn is_master() -> String {
    signature(NETWORKING, "get_IsMaster", &[], "SystemBoolean")
}

pub fn debug_log() -> String {
    signature("UnityEngineDebug", "Log", &["SystemObject"], VOID)
}
