use sha2::{Digest, Sha256, Sha512};

use spore_core::value::{StringContext, Value};
use spore_core::SporeError;

use super::Registry;
use crate::force::force_string;

fn hex_digest(algo: &str, bytes: &[u8], pos: spore_core::PosIdx) -> Result<String, SporeError> {
    match algo {
        "sha256" => {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            Ok(hasher.finalize().iter().map(|b| format!("{b:02x}")).collect())
        }
        "sha512" => {
            let mut hasher = Sha512::new();
            hasher.update(bytes);
            Ok(hasher.finalize().iter().map(|b| format!("{b:02x}")).collect())
        }
        other => Err(SporeError::eval(
            format!("unknown hash algorithm '{other}'"),
            pos,
        )),
    }
}

pub fn register(reg: &mut Registry) {
    reg.add_primop(
        "__hashString",
        2,
        Some("Hex digest of a string under the named algorithm."),
        |ctx, pos, args| {
            let algo = force_string(ctx, &args[0], pos, "while evaluating the first argument of 'hashString'")?;
            let s = force_string(ctx, &args[1], pos, "while evaluating the second argument of 'hashString'")?;
            Ok(Value::string(hex_digest(&algo.text, s.text.as_bytes(), pos)?))
        },
    );

    reg.add_primop(
        "__hashFile",
        2,
        Some("Hex digest of a file's contents under the named algorithm."),
        |ctx, pos, args| {
            let algo = force_string(ctx, &args[0], pos, "while evaluating the first argument of 'hashFile'")?;
            let mut context = StringContext::new();
            let path = crate::coerce::coerce_to_path(ctx, pos, &args[1], &mut context)?;
            let resolved = ctx.sandbox.check_source_path(&path, pos)?;
            let bytes = std::fs::read(&resolved).map_err(|e| {
                SporeError::io(format!("cannot read '{}': {e}", resolved.display()), pos)
            })?;
            Ok(Value::string(hex_digest(&algo.text, &bytes, pos)?))
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use spore_core::pos::NO_POS;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            hex_digest("sha256", b"abc", NO_POS).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_unknown_algorithm() {
        assert!(hex_digest("md5", b"abc", NO_POS).is_err());
    }
}
