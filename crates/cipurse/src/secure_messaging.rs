//! Secure messaging codec
//!
//! Wraps logical commands into protected frames according to the request
//! security level of a [`SessionContext`], and unwraps protected responses
//! according to its response level.
//!
//! A protected command carries `CLA | 0x04` and the data field
//! `SMI || payload || [Le] || MAC`, where the secure messaging indicator
//! (`SMI`) tells the card how the command is protected, how it should
//! protect its answer and whether the original command carried an Le byte.

use bytes::{BufMut, Bytes, BytesMut};
use cipurse_apdu_core::{Command, Response, StatusWord};
use tracing::{trace, warn};

use crate::{
    Error, IntegrityError, Result,
    constants::{MAC_LEN, cla},
    context::{SecurityLevel, SessionContext},
    crypto,
};

/// Bit set in the SMI when the wrapped command carries an Le byte
pub const SMI_LE_PRESENT: u8 = 0x01;

/// Build the secure messaging indicator byte
pub const fn smi(request: SecurityLevel, response: SecurityLevel, le_present: bool) -> u8 {
    (request.bits() << 6) | (response.bits() << 2) | if le_present { SMI_LE_PRESENT } else { 0 }
}

/// Split an SMI byte into request level, response level and the Le flag
pub const fn parse_smi(smi: u8) -> Option<(SecurityLevel, SecurityLevel, bool)> {
    let Some(request) = SecurityLevel::from_bits(smi >> 6) else {
        return None;
    };
    let Some(response) = SecurityLevel::from_bits(smi >> 2) else {
        return None;
    };
    Some((request, response, smi & SMI_LE_PRESENT != 0))
}

/// Response level that actually applies to the answer of the next command.
///
/// A plain command carries no SMI, so the card answers it in plain.
pub(crate) const fn effective_response_level(ctx: &SessionContext) -> SecurityLevel {
    if ctx.request_level().is_secured() {
        ctx.response_level()
    } else {
        SecurityLevel::Plain
    }
}

/// Wrap a logical command according to the context's request level.
///
/// Plain commands are returned unchanged. Protected commands consume one
/// sequence counter value.
pub fn encode_request(ctx: &mut SessionContext, command: &Command) -> Result<Command> {
    let level = ctx.request_level();
    if !level.is_secured() {
        return Ok(command.clone());
    }

    let keys = ctx.session_keys().cloned().ok_or(Error::SessionRequired)?;
    let ssc = ctx.next_ssc();

    let le = command.expected_length();
    let indicator = smi(level, ctx.response_level(), le.is_some());
    let cla = command.class() | cla::SECURE_MESSAGING;
    let header = [cla, command.instruction(), command.p1(), command.p2()];

    let data = command.data().unwrap_or_default();
    let payload: Bytes = match level {
        SecurityLevel::Encrypted if !data.is_empty() => {
            crypto::encrypt_data(keys.enc(), ssc, data).into()
        }
        _ => Bytes::copy_from_slice(data),
    };
    // 256 wraps to the 00 byte
    let le_byte = le.map(|le| [le as u8]);
    let le_slice: &[u8] = match &le_byte {
        Some(byte) => byte,
        None => &[],
    };

    let mac = crypto::calculate_mac(keys.mac(), ssc, &[&header[..], &[indicator][..], &payload[..], le_slice]);

    let mut body = BytesMut::with_capacity(1 + payload.len() + le_slice.len() + MAC_LEN);
    body.put_u8(indicator);
    body.put_slice(&payload);
    body.put_slice(le_slice);
    body.put_slice(&mac);

    trace!(
        ssc,
        smi = indicator,
        mac = %hex::encode(mac),
        "Wrapped command"
    );

    Ok(Command::new(cla, command.instruction(), command.p1(), command.p2())
        .with_data(body.freeze())
        .with_le(0))
}

/// Unwrap a raw response according to the context's response level.
///
/// A bare status word received while the request level is secured means
/// the card dropped the secure session, so the context is cleared. A MAC or
/// padding failure clears the context as well.
pub fn decode_response(ctx: &mut SessionContext, raw: &Bytes) -> Result<Response> {
    if raw.len() < 2 {
        return Err(Error::ResponseTooShort(raw.len()));
    }

    if raw.len() == 2 {
        if ctx.request_level().is_secured() {
            warn!(
                status = %StatusWord::new(raw[0], raw[1]),
                "Bare status word on a secured request, clearing session"
            );
            ctx.clear();
        }
        return Ok(Response::from_bytes(raw)?);
    }

    let level = effective_response_level(ctx);
    if !level.is_secured() {
        return Ok(Response::from_bytes(raw)?);
    }

    match unwrap_protected(ctx, raw, level) {
        Ok(response) => Ok(response),
        Err(e) => {
            warn!(error = %e, "Response integrity check failed, clearing session");
            ctx.clear();
            Err(e)
        }
    }
}

fn unwrap_protected(ctx: &mut SessionContext, raw: &Bytes, level: SecurityLevel) -> Result<Response> {
    let keys = ctx.session_keys().cloned().ok_or(Error::SessionRequired)?;

    let len = raw.len();
    if len < MAC_LEN + 2 {
        return Err(IntegrityError::MissingMac(len).into());
    }

    let status = StatusWord::new(raw[len - 2], raw[len - 1]);
    let body = raw.slice(..len - 2 - MAC_LEN);
    let mac = &raw[len - 2 - MAC_LEN..len - 2];

    let ssc = ctx.next_ssc();
    if !crypto::verify_mac(keys.mac(), ssc, &[&body[..], &status.to_bytes()[..]], mac) {
        return Err(IntegrityError::MacMismatch.into());
    }

    let payload: Bytes = match level {
        SecurityLevel::Encrypted if !body.is_empty() => {
            crypto::decrypt_data(keys.enc(), ssc, &body)
                .ok_or(IntegrityError::Padding)?
                .into()
        }
        _ => body,
    };

    trace!(ssc, %status, "Unwrapped response");
    Ok(Response::new(payload, status))
}
