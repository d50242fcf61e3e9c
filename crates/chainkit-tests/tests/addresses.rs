//! Address derivation and validation across every chain with a plugin.

use chainkit_chains::{BuilderKind, ChainPlugins};
use chainkit_core::{AddressKind, ChainRegistry, Curve};
use chainkit_wallet::KeySigner;
use proptest::prelude::*;

const BECH32_CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const HEX_DIGITS: &str = "0123456789abcdefABCDEF";

fn signer_for(curve: Curve, seed: u8) -> KeySigner {
    match curve {
        Curve::Secp256k1 => KeySigner::secp256k1([seed; 32]).unwrap(),
        Curve::Ed25519 => KeySigner::ed25519([seed; 32]),
    }
}

/// Every variant of `address` with exactly one character replaced by another
/// character of `alphabet`.
fn single_substitutions(address: &str, alphabet: &str) -> Vec<String> {
    let mut variants = Vec::new();
    for (index, original) in address.char_indices() {
        for replacement in alphabet.chars().filter(|&c| c != original) {
            let mut mutated = address.to_string();
            mutated.replace_range(index..index + original.len_utf8(), &replacement.to_string());
            variants.push(mutated);
        }
    }
    variants
}

fn alphabet_of(address: &str) -> &'static str {
    if address.starts_with("0x") {
        HEX_DIGITS
    } else if address.contains('1') && address.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
        BECH32_CHARSET
    } else {
        BASE58_ALPHABET
    }
}

#[test]
fn derived_addresses_validate_on_every_chain() {
    let registry = ChainRegistry::builtin();
    for spec in registry.iter() {
        let Ok(plugins) = ChainPlugins::for_chain(spec) else {
            continue;
        };
        for &curve in &spec.curves {
            let signer = signer_for(curve, 0x42);
            let addresses = plugins.address_service.make_addresses(signer.public_key(), curve).unwrap();
            assert_eq!(addresses[0].kind, AddressKind::Default, "{}", spec.id);
            for address in &addresses {
                assert!(plugins.address_service.validate(&address.value), "{} {}", spec.id, address.value);
            }
        }
    }
}

#[test]
fn bitcoin_wallets_carry_segwit_and_legacy_addresses() {
    let spec = ChainRegistry::builtin().get("litecoin").unwrap();
    let plugins = ChainPlugins::for_chain(&spec).unwrap();
    assert_eq!(plugins.kind, BuilderKind::Bitcoin);
    let signer = signer_for(Curve::Secp256k1, 0x42);
    let addresses = plugins.address_service.make_addresses(signer.public_key(), Curve::Secp256k1).unwrap();
    assert!(addresses[0].value.starts_with("ltc1q"));
    assert_eq!(addresses[1].kind, AddressKind::Legacy);
    assert!(addresses[1].value.starts_with('L'));
}

#[test]
fn single_character_errors_are_caught() {
    let registry = ChainRegistry::builtin();
    for id in ["bitcoin", "ethereum", "polkadot", "kusama"] {
        let spec = registry.get(id).unwrap();
        let plugins = ChainPlugins::for_chain(&spec).unwrap();
        let curve = spec.primary_curve();
        let signer = signer_for(curve, 0x07);

        for address in plugins.address_service.make_addresses(signer.public_key(), curve).unwrap() {
            let variants = single_substitutions(&address.value, alphabet_of(&address.value));
            let accepted = variants.iter().filter(|v| plugins.address_service.validate(v)).count();
            // bech32 detects every substitution; the hash checksums miss at most a handful
            let tolerated = if alphabet_of(&address.value) == BECH32_CHARSET { 0 } else { (variants.len() / 1_000).max(1) };
            assert!(accepted <= tolerated, "{id} {}: {accepted} of {} mutations accepted", address.value, variants.len());
        }
    }
}

#[test]
fn addresses_do_not_cross_networks() {
    let registry = ChainRegistry::builtin();
    let pairs = [("bitcoin", "bitcoin-testnet"), ("bitcoin", "litecoin"), ("polkadot", "kusama"), ("kusama", "westend")];
    for (from, to) in pairs {
        let source = ChainPlugins::for_chain(&registry.get(from).unwrap()).unwrap();
        let target = ChainPlugins::for_chain(&registry.get(to).unwrap()).unwrap();
        let curve = registry.get(from).unwrap().primary_curve();
        let signer = signer_for(curve, 0x09);
        let address = source.address_service.make_address(signer.public_key(), curve).unwrap();
        assert!(!target.address_service.validate(&address), "{from} address accepted on {to}");
    }
}

#[test]
fn wrong_curve_is_rejected() {
    let registry = ChainRegistry::builtin();
    let ed = signer_for(Curve::Ed25519, 1);
    let ethereum = ChainPlugins::for_chain(&registry.get("ethereum").unwrap()).unwrap();
    assert!(ethereum.address_service.make_address(ed.public_key(), Curve::Ed25519).is_err());
    let secp = signer_for(Curve::Secp256k1, 1);
    let westend = ChainPlugins::for_chain(&registry.get("westend").unwrap()).unwrap();
    assert!(westend.address_service.make_address(secp.public_key(), Curve::Secp256k1).is_err());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn any_key_round_trips(seed in prop::array::uniform32(1u8..)) {
        let registry = ChainRegistry::builtin();
        for id in ["bitcoin-testnet", "polygon", "westend"] {
            let spec = registry.get(id).unwrap();
            let plugins = ChainPlugins::for_chain(&spec).unwrap();
            let signer = match spec.primary_curve() {
                Curve::Secp256k1 => KeySigner::secp256k1(seed).unwrap(),
                Curve::Ed25519 => KeySigner::ed25519(seed),
            };
            let address = plugins.address_service.make_address(signer.public_key(), spec.primary_curve()).unwrap();
            prop_assert!(plugins.address_service.validate(&address));
        }
    }
}
